use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// An operator was applied outside of the domain of its forward function,
    /// e.g. `ln` of a non-positive number.
    #[error("`{op}` is not defined for {value}")]
    Domain { op: String, value: f64 },

    #[error("term belongs to session {found}, but the tape is session {expected}")]
    ForeignTerm { expected: u64, found: u64 },

    #[error("literal {0} is not a finite number and cannot be lifted to a constant")]
    NonFiniteLiteral(f64),
}

impl Error {
    pub(crate) fn domain(op: impl Into<String>, value: f64) -> Self {
        let op = op.into();
        log::warn!("rejected `{op}` on {value}: out of domain");
        Self::Domain { op, value }
    }

    pub(crate) fn foreign(expected: u64, found: u64) -> Self {
        log::warn!("rejected term of session {found} on tape of session {expected}");
        Self::ForeignTerm { expected, found }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn test_display() {
    let e = Error::Domain {
        op: "ln".into(),
        value: -1.,
    };
    assert_eq!(e.to_string(), "`ln` is not defined for -1");
    let e = Error::ForeignTerm {
        expected: 3,
        found: 1,
    };
    assert_eq!(
        e.to_string(),
        "term belongs to session 1, but the tape is session 3"
    );
}
