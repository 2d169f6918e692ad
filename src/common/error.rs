/// The error type of the fallible operations of a [`HashMap`][map-struct] and
/// its [`HashMapBuilder`][builder-struct].
///
/// [map-struct]: ./struct.HashMap.html
/// [builder-struct]: ./struct.HashMapBuilder.html
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// A construction parameter is out of its valid range. Returned before any
    /// state is allocated.
    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        reason: &'static str,
    },

    /// The layout supplied to [`HashMap::restore`][restore] cannot describe a
    /// valid map. For example, the number of stripes is not a power of two.
    ///
    /// [restore]: ./struct.HashMap.html#method.restore
    #[error("Corrupted state: {0}")]
    CorruptedState(String),

    /// `remove` or `set_value` was called on an iterator that has not yielded
    /// an entry since its creation or since the previous `remove`.
    #[error(
        "There is no current entry. Call `next` on the iterator first, and do \
    not use an entry after calling `remove` on it"
    )]
    NoCurrentEntry,
}

impl Error {
    pub(crate) fn invalid_argument(name: &'static str, reason: &'static str) -> Self {
        Self::InvalidArgument { name, reason }
    }

    /// Returns `true` if this error was caused by an invalid argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn display() {
        let e = Error::invalid_argument("load_factor", "must be greater than zero");
        assert!(e.is_invalid_argument());
        assert_eq!(
            e.to_string(),
            "Invalid argument `load_factor`: must be greater than zero"
        );

        let e = Error::CorruptedState("bad number of stripes: 3".into());
        assert!(!e.is_invalid_argument());
        assert_eq!(e.to_string(), "Corrupted state: bad number of stripes: 3");
    }
}
