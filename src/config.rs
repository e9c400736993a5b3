use std::time::Duration;

/// Resource ceilings applied to a single runtime instance.
///
/// The wall-clock limit is enforced by the host around every `execute` call;
/// the loop and recursion limits are handed to engines that support them at
/// construction time. Embedded interpreters cannot be interrupted
/// mid-instruction, so a wall-clock overrun marks the instance as failed and
/// the pool replaces it on the next request.
#[derive(Clone, Debug)]
pub struct ExecutionLimits {
    pub wall_time_ms: Option<u64>,
    pub loop_iteration_limit: Option<u64>,
    pub recursion_limit: Option<usize>,
}

impl ExecutionLimits {
    pub fn wall_time(&self) -> Option<Duration> {
        self.wall_time_ms.map(Duration::from_millis)
    }

    /// Limits with every ceiling disabled.
    pub fn unbounded() -> Self {
        Self {
            wall_time_ms: None,
            loop_iteration_limit: None,
            recursion_limit: None,
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            wall_time_ms: Some(10_000),
            loop_iteration_limit: None,
            recursion_limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_have_a_wall_clock_ceiling() {
        let limits = ExecutionLimits::default();
        assert_eq!(limits.wall_time(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn unbounded_limits_disable_everything() {
        let limits = ExecutionLimits::unbounded();
        assert_eq!(limits.wall_time(), None);
        assert_eq!(limits.loop_iteration_limit, None);
        assert_eq!(limits.recursion_limit, None);
    }
}
