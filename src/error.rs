use std::fmt;

use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Cycle,
    Storage,
    Unknown,
}

/// Error returned by every engine and room store operation.
///
/// `public` is safe to show to an end user; `source` carries the diagnostic
/// detail and is only meant for logs.
#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn validation(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Validation,
            code: "validation_error",
            public,
            source,
        }
    }

    pub fn validation_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::Validation,
            code,
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    pub fn not_found_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code,
            public,
            source,
        }
    }

    pub fn conflict(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            code: "name_conflict",
            public,
            source,
        }
    }

    pub fn conflict_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::Conflict,
            code,
            public,
            source,
        }
    }

    pub fn cycle(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Cycle,
            code: "move_cycle",
            public,
            source,
        }
    }

    pub fn storage(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Storage,
            code: "storage_error",
            public,
            source,
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            source,
        }
    }

    pub fn unknown_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code,
            public,
            source,
        }
    }

    pub fn message(public: &'static str) -> Self {
        Self::unknown(public, anyhow!(public))
    }

    pub fn room_not_found(room_id: impl fmt::Display) -> Self {
        Self::not_found_with_code(
            "room_not_found",
            "Room not found",
            anyhow!("room {} not found", room_id),
        )
    }

    pub fn node_not_found(node_id: impl fmt::Display) -> Self {
        Self::not_found_with_code(
            "node_not_found",
            "Node not found",
            anyhow!("node {} not found", node_id),
        )
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for LibError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.public, self.code, self.source)
    }
}

impl std::error::Error for LibError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::storage("Record store request failed", anyhow!(value))
    }
}

impl From<serde_json::Error> for LibError {
    fn from(value: serde_json::Error) -> Self {
        Self::storage("Stored record could not be decoded", anyhow!(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_public_message_and_code() {
        let err = LibError::conflict(
            "A node with this name already exists in this location",
            anyhow!("duplicate"),
        );
        let rendered = err.to_string();
        assert!(rendered.contains("already exists"));
        assert!(rendered.contains("name_conflict"));
        assert!(err.is_kind(ErrorKind::Conflict));
    }

    #[test]
    fn room_not_found_carries_room_scoped_code() {
        let err = LibError::room_not_found("dr-1");
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(err.code, "room_not_found");
        assert!(err.source.to_string().contains("dr-1"));
    }
}
