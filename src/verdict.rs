use std::fmt;

use color_eyre::Report;

/// Result state of a check, following the usual monitoring plugin exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Verdict {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Unknown => 3,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// The verdict of one invocation and the lines to print for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub verdict: Verdict,
    pub messages: Vec<String>,
}

impl Outcome {
    pub fn new(verdict: Verdict, messages: Vec<String>) -> Self {
        Self { verdict, messages }
    }

    /// A fatal error before or during the scrape.
    pub fn unknown(err: &Report) -> Self {
        Self::new(Verdict::Unknown, vec![format!("Failed: {:#}", err)])
    }

    pub fn print(&self) {
        for message in &self.messages {
            println!("{}", message);
        }
    }
}
