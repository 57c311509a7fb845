//! User-facing transient messages (toasts)

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
}

impl Notice {
    pub fn info(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            severity: Severity::Info,
        }
    }

    pub fn error(title: &str) -> Self {
        Self {
            title: title.to_string(),
            description: None,
            severity: Severity::Error,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
