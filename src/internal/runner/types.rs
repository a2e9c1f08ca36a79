// src/internal/runner/types.rs

/// Captured result of one test-runner invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error, as one text block
    pub fn combined_text(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();

        let mut text = match (stdout.is_empty(), stderr.is_empty()) {
            (false, false) => format!("{}\n{}", stdout, stderr),
            (false, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (true, true) => String::new(),
        };

        if self.exit_code.is_none() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("(process terminated by a signal)");
        }
        text
    }
}
