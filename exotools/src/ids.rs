//! Catalog identifiers.

/// Defines a newtype ID wrapper around an integer-like scalar (typically `i64`)
/// and generates:
/// - derives (Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)
/// - `Display`
/// - `From<$inner> for $name` and `From<$name> for $inner`
///
/// Usage:
///   define_id_type!(i64, TicId);
#[macro_export]
macro_rules! define_id_type {
    ($inner:ty, $name:ident) => {
        #[derive(
            Debug,
            Copy,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(pub $inner);

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::write!(f, "{}", self.0)
            }
        }

        impl ::std::convert::From<$inner> for $name {
            fn from(v: $inner) -> Self {
                $name(v)
            }
        }

        impl ::std::convert::From<$name> for $inner {
            fn from(v: $name) -> Self {
                v.0
            }
        }

        impl $name {
            pub fn new(value: $inner) -> Self {
                $name(value)
            }

            pub fn value(&self) -> $inner {
                self.0
            }
        }
    };
}

define_id_type!(i64, TicId);
define_id_type!(i64, GaiaId);

impl TicId {
    /// Parse a TIC designation such as `"TIC 25155310"` or a bare number.
    pub fn parse_designation(s: &str) -> Option<Self> {
        parse_trailing_integer(s, &["TIC"]).map(TicId)
    }
}

impl GaiaId {
    /// Parse a Gaia designation such as `"Gaia DR2 4651629489160555392"`,
    /// `"Gaia DR3 ..."` or a bare number.
    pub fn parse_designation(s: &str) -> Option<Self> {
        parse_trailing_integer(s, &["Gaia", "DR1", "DR2", "DR3", "EDR3"]).map(GaiaId)
    }
}

/// Parse `"<prefix tokens> <integer>"`, accepting only the known prefix tokens.
fn parse_trailing_integer(s: &str, prefixes: &[&str]) -> Option<i64> {
    let mut tokens = s.split_whitespace().peekable();
    let mut last = None;
    while let Some(token) = tokens.next() {
        if tokens.peek().is_none() {
            last = Some(token);
        } else if !prefixes.iter().any(|p| p.eq_ignore_ascii_case(token)) {
            return None;
        }
    }
    last?.parse::<i64>().ok()
}
