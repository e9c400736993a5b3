use tokio::sync::mpsc;

/// The two output streams captured during an execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug)]
struct Chunk {
    stream: StreamKind,
    text: String,
}

/// Writer half of the capture channel.
///
/// Handed to an engine backend at construction; every chunk the interpreter
/// emits is sent through here. Cloneable so a backend can wire it into more
/// than one sink.
#[derive(Clone, Debug)]
pub struct CaptureHandle {
    tx: mpsc::UnboundedSender<Chunk>,
}

impl CaptureHandle {
    pub fn write(&self, stream: StreamKind, text: impl Into<String>) {
        // A dropped capture means the execution is already over; the chunk
        // has nowhere to go.
        let _ = self.tx.send(Chunk {
            stream,
            text: text.into(),
        });
    }
}

/// Concatenated stream contents for one execution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapturedStreams {
    pub stdout: String,
    pub stderr: String,
}

/// Reader half of the capture channel, scoped to one runtime instance.
///
/// Chunks arrive in write order per execution. `clear` must run before every
/// new execution on the same instance so stale output from a prior run never
/// leaks into a new result.
#[derive(Debug)]
pub struct OutputCapture {
    tx: mpsc::UnboundedSender<Chunk>,
    rx: mpsc::UnboundedReceiver<Chunk>,
}

impl OutputCapture {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn handle(&self) -> CaptureHandle {
        CaptureHandle {
            tx: self.tx.clone(),
        }
    }

    /// Concatenates everything written since the last `drain`/`clear`.
    pub fn drain(&mut self) -> CapturedStreams {
        let mut streams = CapturedStreams::default();
        while let Ok(chunk) = self.rx.try_recv() {
            match chunk.stream {
                StreamKind::Stdout => streams.stdout.push_str(&chunk.text),
                StreamKind::Stderr => streams.stderr.push_str(&chunk.text),
            }
        }
        streams
    }

    /// Discards anything still buffered.
    pub fn clear(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

impl Default for OutputCapture {
    fn default() -> Self {
        Self::new()
    }
}
