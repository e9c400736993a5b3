//! Erasable-syntax TypeScript front end.
//!
//! Strips the annotations the embedded JavaScript engine cannot parse
//! (variable/parameter/return annotations, `interface` and `type`
//! declarations, `as` casts, optional and non-null markers) and collects
//! static diagnostics for the mismatches visible without a full checker,
//! namely literal initializers that contradict a primitive annotation.
//! Class member modifiers, enums, namespaces and decorators are outside the
//! supported surface; they reach the engine untouched and fail there.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Ident,
    Number,
    Str,
    Arrow,
    Punct(char),
}

#[derive(Clone, Copy, Debug)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
    line: usize,
}

/// A static finding, anchored to a 1-based source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDiagnostic {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for TypeDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Output of the front end: executable JavaScript plus findings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transpiled {
    pub source: String,
    pub diagnostics: Vec<TypeDiagnostic>,
}

pub fn strip_types(source: &str) -> Transpiled {
    let tokens = lex(source);
    let mut pass = StripPass {
        source,
        tokens: &tokens,
        removals: Vec::new(),
        diagnostics: Vec::new(),
    };
    pass.run();
    let StripPass {
        removals,
        diagnostics,
        ..
    } = pass;
    Transpiled {
        source: apply_removals(source, removals),
        diagnostics,
    }
}

fn lex(source: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && i + 1 < chars.len() {
            match chars[i + 1].1 {
                '/' => {
                    while i < chars.len() && chars[i].1 != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '*' => {
                    i += 2;
                    while i + 1 < chars.len() && !(chars[i].1 == '*' && chars[i + 1].1 == '/') {
                        if chars[i].1 == '\n' {
                            line += 1;
                        }
                        i += 1;
                    }
                    i = (i + 2).min(chars.len());
                    continue;
                }
                _ => {}
            }
        }
        if c == '"' || c == '\'' || c == '`' {
            // Template substitutions are not tracked; a backtick inside
            // `${}` ends the token early.
            let start = pos;
            let start_line = line;
            i += 1;
            while i < chars.len() {
                let d = chars[i].1;
                if d == '\\' {
                    i += 2;
                    continue;
                }
                if d == '\n' {
                    line += 1;
                }
                if d == c {
                    break;
                }
                i += 1;
            }
            let end = if i < chars.len() {
                chars[i].0 + chars[i].1.len_utf8()
            } else {
                source.len()
            };
            if i < chars.len() {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Str,
                start,
                end,
                line: start_line,
            });
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            let start = pos;
            while i < chars.len()
                && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '_' || chars[i].1 == '$')
            {
                i += 1;
            }
            let end = if i < chars.len() { chars[i].0 } else { source.len() };
            tokens.push(Token {
                kind: TokenKind::Ident,
                start,
                end,
                line,
            });
            continue;
        }
        if c.is_ascii_digit() {
            let start = pos;
            while i < chars.len() && (chars[i].1.is_ascii_alphanumeric() || chars[i].1 == '.') {
                i += 1;
            }
            let end = if i < chars.len() { chars[i].0 } else { source.len() };
            tokens.push(Token {
                kind: TokenKind::Number,
                start,
                end,
                line,
            });
            continue;
        }
        if c == '=' && i + 1 < chars.len() && chars[i + 1].1 == '>' {
            tokens.push(Token {
                kind: TokenKind::Arrow,
                start: pos,
                end: pos + 2,
                line,
            });
            i += 2;
            continue;
        }
        tokens.push(Token {
            kind: TokenKind::Punct(c),
            start: pos,
            end: pos + c.len_utf8(),
            line,
        });
        i += 1;
    }

    tokens
}

/// Context an annotation appears in; decides which tokens end it.
#[derive(Clone, Copy, PartialEq)]
enum AnnotationContext {
    Declaration,
    Parameter,
}

struct StripPass<'a> {
    source: &'a str,
    tokens: &'a [Token],
    removals: Vec<(usize, usize)>,
    diagnostics: Vec<TypeDiagnostic>,
}

impl<'a> StripPass<'a> {
    fn run(&mut self) {
        let mut i = 0;
        while i < self.tokens.len() {
            i = self.step(i);
        }
    }

    fn text(&self, idx: usize) -> &'a str {
        let t = &self.tokens[idx];
        &self.source[t.start..t.end]
    }

    fn kind(&self, idx: usize) -> Option<TokenKind> {
        self.tokens.get(idx).map(|t| t.kind)
    }

    fn is_punct(&self, idx: usize, c: char) -> bool {
        self.kind(idx) == Some(TokenKind::Punct(c))
    }

    fn at_statement_start(&self, idx: usize) -> bool {
        if idx == 0 {
            return true;
        }
        let prev = &self.tokens[idx - 1];
        matches!(prev.kind, TokenKind::Punct(';' | '{' | '}'))
            || self.tokens[idx].line > prev.line
    }

    /// Handles the token at `i`, records any removals and returns the next
    /// index to look at.
    fn step(&mut self, i: usize) -> usize {
        match self.tokens[i].kind {
            TokenKind::Ident => match self.text(i) {
                "interface" if self.at_statement_start(i) && self.kind(i + 1) == Some(TokenKind::Ident) => {
                    self.remove_interface(i)
                }
                "type"
                    if self.at_statement_start(i)
                        && self.kind(i + 1) == Some(TokenKind::Ident)
                        && (self.is_punct(i + 2, '=') || self.is_punct(i + 2, '<')) =>
                {
                    self.remove_type_alias(i)
                }
                "const" | "let" | "var" => self.strip_declaration(i),
                "function" => self.strip_function_header(i),
                "as" => self.strip_cast(i),
                _ => i + 1,
            },
            TokenKind::Punct('(') => self.maybe_strip_arrow(i),
            TokenKind::Punct('!') => self.maybe_strip_non_null(i),
            _ => i + 1,
        }
    }

    fn remove_interface(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        while j < self.tokens.len() && !self.is_punct(j, '{') {
            if self.is_punct(j, ';') {
                return i + 1;
            }
            j += 1;
        }
        let Some(close) = self.matching_brace(j) else {
            return i + 1;
        };
        self.removals.push((self.tokens[i].start, self.tokens[close].end));
        close + 1
    }

    fn remove_type_alias(&mut self, i: usize) -> usize {
        let mut depth = 0i32;
        let mut j = i + 2;
        while j < self.tokens.len() {
            let tk = &self.tokens[j];
            if depth <= 0 && j > i + 2 && tk.line > self.tokens[j - 1].line {
                let prev = self.tokens[j - 1].kind;
                let continuation = matches!(
                    prev,
                    TokenKind::Punct('=' | '|' | '&' | '<' | ',')
                ) || matches!(tk.kind, TokenKind::Punct('|' | '&'));
                if !continuation {
                    self.removals.push((self.tokens[i].start, self.tokens[j - 1].end));
                    return j;
                }
            }
            match tk.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => depth -= 1,
                TokenKind::Punct(';') if depth <= 0 => {
                    self.removals.push((self.tokens[i].start, tk.end));
                    return j + 1;
                }
                _ => {}
            }
            j += 1;
        }
        self.removals
            .push((self.tokens[i].start, self.tokens[self.tokens.len() - 1].end));
        self.tokens.len()
    }

    fn strip_declaration(&mut self, i: usize) -> usize {
        if self.kind(i + 1) != Some(TokenKind::Ident) || !self.is_punct(i + 2, ':') {
            return i + 1;
        }
        let colon = i + 2;
        let (last, terminator) = self.scan_annotation(colon + 1, AnnotationContext::Declaration);
        self.removals.push((self.tokens[colon].start, self.tokens[last].end));

        // Literal initializers can be checked against primitive annotations
        // without a real checker.
        if last == colon + 1 {
            let annotated = self.text(colon + 1);
            if matches!(annotated, "number" | "string" | "boolean") {
                if let Some(term) = terminator {
                    if self.is_punct(term, '=') {
                        if let Some(actual) = self.literal_kind(term + 1) {
                            if actual != annotated {
                                let line = self.tokens[term + 1].line;
                                self.diagnostics.push(TypeDiagnostic {
                                    line,
                                    message: format!(
                                        "Type '{actual}' is not assignable to type '{annotated}'."
                                    ),
                                });
                            }
                        }
                    }
                }
            }
        }

        last + 1
    }

    fn strip_function_header(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        if self.kind(j) == Some(TokenKind::Ident) {
            j += 1;
        }
        if self.is_punct(j, '<') {
            if let Some(close) = self.matching_angle(j) {
                self.removals.push((self.tokens[j].start, self.tokens[close].end));
                j = close + 1;
            }
        }
        if !self.is_punct(j, '(') {
            return i + 1;
        }
        let close = self.strip_param_group(j);

        if self.is_punct(close + 1, ':') {
            let ret = close + 1;
            let mut depth = 0i32;
            let mut k = ret + 1;
            while k < self.tokens.len() {
                match self.tokens[k].kind {
                    TokenKind::Punct('(' | '[' | '<') => depth += 1,
                    TokenKind::Punct(')' | ']' | '>') => depth -= 1,
                    // The first token of the annotation may itself be an
                    // object type; only a later depth-zero brace opens the
                    // function body.
                    TokenKind::Punct('{') if depth <= 0 && k > ret + 1 => {
                        self.removals.push((self.tokens[ret].start, self.tokens[k - 1].end));
                        return k;
                    }
                    TokenKind::Punct('{') => depth += 1,
                    TokenKind::Punct('}') => depth -= 1,
                    _ => {}
                }
                k += 1;
            }
            return close + 1;
        }

        close + 1
    }

    /// Strips `: T` annotations and `?` markers inside one parenthesized
    /// parameter list. Returns the index of the closing parenthesis.
    fn strip_param_group(&mut self, open: usize) -> usize {
        let mut depth = 1i32;
        let mut k = open + 1;
        while k < self.tokens.len() {
            match self.tokens[k].kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    depth -= 1;
                    if depth == 0 {
                        return k;
                    }
                }
                TokenKind::Punct(':') if depth == 1 => {
                    let mut removal_start = self.tokens[k].start;
                    if k > 0 && self.is_punct(k - 1, '?') {
                        removal_start = self.tokens[k - 1].start;
                    }
                    let (last, _) = self.scan_annotation(k + 1, AnnotationContext::Parameter);
                    self.removals.push((removal_start, self.tokens[last].end));
                    k = last;
                }
                _ => {}
            }
            k += 1;
        }
        self.tokens.len() - 1
    }

    fn maybe_strip_arrow(&mut self, i: usize) -> usize {
        let candidate = if i == 0 {
            true
        } else {
            let prev = &self.tokens[i - 1];
            matches!(prev.kind, TokenKind::Arrow)
                || matches!(
                    prev.kind,
                    TokenKind::Punct('=' | '(' | ',' | '[' | '{' | ';' | ':' | '?' | '&' | '|' | '!')
                )
                || (prev.kind == TokenKind::Ident && self.text(i - 1) == "return")
        };
        if !candidate {
            return i + 1;
        }
        let Some(close) = self.matching_group(i) else {
            return i + 1;
        };

        if self.kind(close + 1) == Some(TokenKind::Arrow) {
            self.strip_param_group(i);
            return close + 2;
        }

        // `(params): ReturnType => body`
        if self.is_punct(close + 1, ':') {
            let mut depth = 0i32;
            let mut k = close + 2;
            while k < self.tokens.len() {
                match self.tokens[k].kind {
                    TokenKind::Arrow if depth <= 0 => {
                        self.removals
                            .push((self.tokens[close + 1].start, self.tokens[k - 1].end));
                        self.strip_param_group(i);
                        return k + 1;
                    }
                    TokenKind::Punct('(' | '[' | '{' | '<') => depth += 1,
                    TokenKind::Punct(')' | ']' | '}' | '>') => {
                        depth -= 1;
                        if depth < 0 {
                            break;
                        }
                    }
                    TokenKind::Punct(';' | ',') if depth <= 0 => break,
                    _ => {}
                }
                k += 1;
            }
        }

        i + 1
    }

    fn maybe_strip_non_null(&mut self, i: usize) -> usize {
        if i == 0 || self.is_punct(i + 1, '=') {
            return i + 1;
        }
        let prev = &self.tokens[i - 1];
        let value_like = match prev.kind {
            TokenKind::Number | TokenKind::Str | TokenKind::Punct(')' | ']') => true,
            TokenKind::Ident => !matches!(
                self.text(i - 1),
                "return" | "typeof" | "delete" | "void" | "in" | "of" | "case" | "do" | "else"
                    | "instanceof" | "new" | "throw" | "await" | "yield"
            ),
            _ => false,
        };
        if value_like {
            self.removals.push((self.tokens[i].start, self.tokens[i].end));
        }
        i + 1
    }

    fn strip_cast(&mut self, i: usize) -> usize {
        let prev_ok = i > 0
            && matches!(
                self.tokens[i - 1].kind,
                TokenKind::Ident | TokenKind::Number | TokenKind::Str | TokenKind::Punct(')' | ']')
            );
        if !prev_ok || self.kind(i + 1) != Some(TokenKind::Ident) {
            return i + 1;
        }

        let mut last = i + 1;
        let mut j = i + 2;
        loop {
            if self.is_punct(j, '.') && self.kind(j + 1) == Some(TokenKind::Ident) {
                last = j + 1;
                j += 2;
                continue;
            }
            if self.is_punct(j, '<') {
                if let Some(close) = self.matching_angle(j) {
                    last = close;
                    j = close + 1;
                    continue;
                }
            }
            if self.is_punct(j, '[') && self.is_punct(j + 1, ']') {
                last = j + 1;
                j += 2;
                continue;
            }
            break;
        }

        self.removals.push((self.tokens[i].start, self.tokens[last].end));
        j
    }

    /// Scans a type annotation starting at `start` and returns the index of
    /// its last token plus the terminator index, if one was seen.
    fn scan_annotation(
        &self,
        start: usize,
        context: AnnotationContext,
    ) -> (usize, Option<usize>) {
        let mut depth = 0i32;
        let mut angle = 0i32;
        let mut j = start;
        while j < self.tokens.len() {
            let tk = &self.tokens[j];

            if depth <= 0 && angle <= 0 && j > start && tk.line > self.tokens[j - 1].line {
                let prev = self.tokens[j - 1].kind;
                let continuation =
                    matches!(prev, TokenKind::Punct('|' | '&' | ',' | '<' | ':'))
                        || matches!(tk.kind, TokenKind::Punct('|' | '&'));
                if !continuation {
                    return (j - 1, None);
                }
            }

            match tk.kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    depth -= 1;
                    if depth < 0 {
                        return (j.saturating_sub(1).max(start.saturating_sub(1)), Some(j));
                    }
                }
                TokenKind::Punct('<') => angle += 1,
                TokenKind::Punct('>') => angle -= 1,
                TokenKind::Punct(c) if depth <= 0 && angle <= 0 => {
                    let ends = match context {
                        AnnotationContext::Declaration => matches!(c, '=' | ';' | ','),
                        AnnotationContext::Parameter => matches!(c, '=' | ','),
                    };
                    if ends {
                        return (j.saturating_sub(1).max(start.saturating_sub(1)), Some(j));
                    }
                }
                _ => {}
            }
            j += 1;
        }
        (self.tokens.len() - 1, None)
    }

    fn literal_kind(&self, idx: usize) -> Option<&'static str> {
        match self.kind(idx)? {
            TokenKind::Number => Some("number"),
            TokenKind::Str => Some("string"),
            TokenKind::Ident => match self.text(idx) {
                "true" | "false" => Some("boolean"),
                _ => None,
            },
            _ => None,
        }
    }

    fn matching_brace(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for j in open..self.tokens.len() {
            match self.tokens[j].kind {
                TokenKind::Punct('{') => depth += 1,
                TokenKind::Punct('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn matching_group(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for j in open..self.tokens.len() {
            match self.tokens[j].kind {
                TokenKind::Punct('(' | '[' | '{') => depth += 1,
                TokenKind::Punct(')' | ']' | '}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn matching_angle(&self, open: usize) -> Option<usize> {
        let mut depth = 0i32;
        for j in open..self.tokens.len() {
            match self.tokens[j].kind {
                TokenKind::Punct('<') => depth += 1,
                TokenKind::Punct('>') => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(j);
                    }
                }
                TokenKind::Punct(';') => return None,
                _ => {}
            }
        }
        None
    }
}

fn apply_removals(source: &str, mut removals: Vec<(usize, usize)>) -> String {
    if removals.is_empty() {
        return source.to_string();
    }
    removals.sort_by_key(|r| r.0);

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(removals.len());
    for (start, end) in removals {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(source.len());
    let mut pos = 0;
    for (start, end) in merged {
        if start > pos {
            out.push_str(&source[pos..start]);
        }
        out.push(' ');
        pos = pos.max(end);
    }
    out.push_str(&source[pos..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_javascript_passes_through_untouched() {
        let input = "var o = {a: 1, b: 2}; o.a + o.b";
        let out = strip_types(input);
        assert_eq!(out.source, input);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn ternaries_are_not_annotations() {
        let input = "var x = true ? 1 : 2; x";
        let out = strip_types(input);
        assert_eq!(out.source, input);
    }

    #[test]
    fn strings_containing_colons_are_untouched() {
        let input = "var s = 'a: b'; s";
        let out = strip_types(input);
        assert_eq!(out.source, input);
    }

    #[test]
    fn variable_annotations_are_stripped() {
        let out = strip_types("const x: number = 41; x + 1");
        assert!(!out.source.contains(": number"), "got: {}", out.source);
        assert!(out.source.contains("const x"));
        assert!(out.source.contains("= 41"));
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn mismatched_literal_initializer_is_diagnosed_but_still_executable() {
        let out = strip_types("const x: number = \"hello\"; x");
        assert_eq!(out.diagnostics.len(), 1);
        let diagnostic = &out.diagnostics[0];
        assert_eq!(diagnostic.line, 1);
        assert!(
            diagnostic.message.contains("'string' is not assignable to type 'number'"),
            "got: {}",
            diagnostic.message
        );
        assert!(!out.source.contains(": number"));
        assert!(out.source.contains("\"hello\""));
    }

    #[test]
    fn matching_literal_initializers_produce_no_diagnostic() {
        assert!(strip_types("const s: string = 'ok';").diagnostics.is_empty());
        assert!(strip_types("let n: number = 5;").diagnostics.is_empty());
        assert!(strip_types("var b: boolean = true;").diagnostics.is_empty());
    }

    #[test]
    fn boolean_annotation_rejects_number_literal() {
        let out = strip_types("let flag: boolean = 1;");
        assert_eq!(out.diagnostics.len(), 1);
        assert!(out.diagnostics[0].message.contains("'number' is not assignable to type 'boolean'"));
    }

    #[test]
    fn diagnostics_carry_the_source_line() {
        let out = strip_types("var ok = 1;\nconst x: string = 2;\n");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].line, 2);
    }

    #[test]
    fn function_parameter_and_return_annotations_are_stripped() {
        let out = strip_types("function add(a: number, b: number): number { return a + b }\nadd(2, 3)");
        assert!(!out.source.contains(": number"), "got: {}", out.source);
        assert!(out.source.contains("function add(a"));
        assert!(out.source.contains("return a + b"));
    }

    #[test]
    fn optional_parameter_markers_are_stripped() {
        let out = strip_types("function f(a?: number) { return a }");
        assert!(!out.source.contains('?'), "got: {}", out.source);
        assert!(!out.source.contains(": number"));
    }

    #[test]
    fn arrow_annotations_are_stripped() {
        let out = strip_types("const double = (x: number): number => x * 2; double(21)");
        assert!(!out.source.contains(": number"), "got: {}", out.source);
        assert!(out.source.contains("=> x * 2"));
    }

    #[test]
    fn interface_declarations_are_removed() {
        let out = strip_types("interface Point { x: number; y: number }\nvar p = {x: 1, y: 2}; p.x");
        assert!(!out.source.contains("interface"), "got: {}", out.source);
        assert!(out.source.contains("var p = {x: 1, y: 2}"));
    }

    #[test]
    fn type_aliases_are_removed() {
        let out = strip_types("type Id = string;\nvar id = 'a'; id");
        assert!(!out.source.contains("type Id"), "got: {}", out.source);
        assert!(out.source.contains("var id = 'a'"));
    }

    #[test]
    fn as_casts_are_removed() {
        let out = strip_types("var n = 'x' as unknown as string; n");
        assert!(!out.source.contains(" as "), "got: {}", out.source);
        assert!(out.source.contains("var n = 'x'"));
    }

    #[test]
    fn non_null_assertions_are_removed_but_negation_is_kept() {
        let out = strip_types("var a = value!; var b = !flag; var c = x !== y;");
        assert!(out.source.contains("!flag"));
        assert!(out.source.contains("!=="));
        assert!(!out.source.contains("value!"), "got: {}", out.source);
    }

    #[test]
    fn comments_survive_stripping() {
        let input = "// keep: this comment\nvar x = 1;";
        let out = strip_types(input);
        assert_eq!(out.source, input);
    }

    #[test]
    fn stripped_output_of_typed_code_is_plain_javascript() {
        let out = strip_types(
            "interface User { name: string }\n\
             const greet = (user: { name: string }): string => 'hi ' + user.name;\n\
             greet({ name: 'ada' })",
        );
        assert!(!out.source.contains("interface"));
        assert!(!out.source.contains(": string"));
        assert!(out.source.contains("greet({ name: 'ada' })"));
    }
}
