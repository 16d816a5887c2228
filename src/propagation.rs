use std::fmt;
use std::str::FromStr;

/// How a unit of work relates to a transaction that is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Propagation {
    /// Join the active transaction, or start one if there is none.
    #[default]
    Required,

    /// Always start a new, independent transaction on its own connection.
    /// The caller's transaction is untouched and resumes afterwards.
    RequiresNew,

    /// Run inside a savepoint of the active transaction, or behave like
    /// [`Propagation::Required`] if there is none.
    Nested,
}

impl Propagation {
    /// Every supported propagation, in declaration order.
    pub const ALL: [Propagation; 3] = [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Nested,
    ];

    /// The conventional upper-case name, e.g. `REQUIRES_NEW`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Propagation::Required => "REQUIRED",
            Propagation::RequiresNew => "REQUIRES_NEW",
            Propagation::Nested => "NESTED",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Propagation {
    type Err = crate::Error;

    /// Case-insensitive; `-`, `_` and spaces are interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match normalized.as_str() {
            "REQUIRED" => Ok(Propagation::Required),
            "REQUIRES_NEW" => Ok(Propagation::RequiresNew),
            "NESTED" => Ok(Propagation::Nested),
            _ => Err(crate::Error::UnsupportedPropagation(s.to_string())),
        }
    }
}
