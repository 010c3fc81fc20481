/// Accumulates generated C++ line by line, tracking block indentation
#[derive(Debug, Default)]
pub struct CodeWriter {
    output: String,
    indent: usize,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_output(self) -> String {
        self.output
    }

    /// Appends text without indentation
    pub fn push_line(&mut self, string: impl AsRef<str>) {
        self.output.push_str(string.as_ref());
        self.output.push('\n');
    }

    /// Appends one line at the current indentation
    pub fn emit(&mut self, string: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
        self.push_line(string);
    }

    pub fn blank(&mut self) {
        self.output.push('\n');
    }

    pub fn comment(&mut self, comment: impl AsRef<str>) {
        self.emit(format!("// {}", comment.as_ref()));
    }

    /// Emits `header {` (or a bare `{` for an empty header) and indents
    /// what follows
    pub fn open(&mut self, header: impl AsRef<str>) {
        match header.as_ref() {
            "" => self.emit("{"),
            header => self.emit(format!("{header} {{")),
        }
        self.indent += 1;
    }

    /// Closes the innermost block, appending `suffix` after the brace
    pub fn close(&mut self, suffix: &str) {
        self.indent = self.indent.saturating_sub(1);
        self.emit(format!("}}{suffix}"));
    }
}
