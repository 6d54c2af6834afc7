use std::fmt::{self, Display, Formatter};

const SCHEME: &str = "sqlx";

/// Control suffix appended to a connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Provision a fresh database when none exists under the name.
    Create,
    /// Destroy the named database.
    Drop,
}

impl Display for Directive {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create=true"),
            Self::Drop => write!(f, "drop=true"),
        }
    }
}

/// Connection URL of a named in-memory database.
///
/// Renders as `sqlx:<engine>:memory:<name>`, followed by `;<directive>` for
/// the start and shutdown variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionUrl {
    engine: String,
    name: String,
    directive: Option<Directive>,
}

impl ConnectionUrl {
    pub fn memory(engine: impl Into<String>, name: impl Into<String>) -> Self {
        Self { engine: engine.into(), name: name.into(), directive: None }
    }

    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = Some(directive);
        self
    }

    #[must_use]
    pub fn engine(&self) -> &str {
        &self.engine
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn directive(&self) -> Option<Directive> {
        self.directive
    }
}

impl Display for ConnectionUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}:{}:memory:{}", self.engine, self.name)?;

        if let Some(directive) = self.directive {
            write!(f, ";{directive}")?;
        }

        Ok(())
    }
}
