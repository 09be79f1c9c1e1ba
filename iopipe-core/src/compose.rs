//! Flat, order-preserving composition of failures.
//!
//! [`compose`] folds any number of optional failures into one [`CompositeError`]
//! whose message is every underlying message joined with [`SEPARATOR`]. There is
//! no error tree: consumers only ever see the text.

use std::fmt;

/// Delimiter placed between composed failure messages.
pub const SEPARATOR: &str = ":";

/// A failure standing in for one or more underlying failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeError {
    message: String,
}

impl CompositeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CompositeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CompositeError {}

/// Append the present `failures` to `base`.
///
/// Absent failures (and failures with an empty message) are dropped. When
/// nothing is left to append, `base` is returned unchanged, so `compose(None,
/// [])` is `None`.
pub fn compose<I, E>(base: Option<CompositeError>, failures: I) -> Option<CompositeError>
where
    I: IntoIterator<Item = Option<E>>,
    E: fmt::Display,
{
    let joined = failures
        .into_iter()
        .flatten()
        .map(|e| e.to_string())
        .filter(|m| !m.is_empty())
        .collect::<Vec<_>>()
        .join(SEPARATOR);

    if joined.is_empty() {
        return base;
    }

    Some(match base {
        None => CompositeError::new(joined),
        Some(base) => CompositeError::new(format!("{base}{SEPARATOR}{joined}")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn err(msg: &str) -> Option<CompositeError> {
        Some(CompositeError::new(msg))
    }

    #[test]
    fn nothing_to_compose_is_no_failure() {
        assert_eq!(compose(None, Vec::<Option<CompositeError>>::new()), None);
        assert_eq!(compose(None, [None::<CompositeError>, None]), None);
    }

    #[test]
    fn absent_failures_are_skipped() {
        let composed = compose(None, [err("f1"), None, err("f2")]).expect("failure");
        assert_eq!(composed.message(), "f1:f2");
    }

    #[rstest]
    #[case::no_base(None, "a:b")]
    #[case::with_base(Some("base"), "base:a:b")]
    #[case::nested_base(Some("x:y"), "x:y:a:b")]
    fn base_prefixes_joined_messages(#[case] base: Option<&str>, #[case] expected: &str) {
        let base = base.map(CompositeError::new);
        let composed = compose(base, [err("a"), err("b")]).expect("failure");
        assert_eq!(composed.to_string(), expected);
    }

    #[test]
    fn base_survives_when_nothing_is_appended() {
        let composed = compose(err("base"), [None::<CompositeError>]).expect("failure");
        assert_eq!(composed.message(), "base");
    }

    #[test]
    fn incremental_composition_preserves_order() {
        let mut acc = None;
        for msg in ["one", "two", "three"] {
            acc = compose(acc, [Some(msg)]);
        }
        assert_eq!(acc.expect("failure").message(), "one:two:three");
    }

    #[test]
    fn accepts_foreign_error_types() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let composed = compose(None, [Some(io)]).expect("failure");
        assert_eq!(composed.message(), "missing");
    }
}
