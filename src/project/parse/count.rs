use log::trace;

use crate::{
    domain::{Count, TypeName},
    span::Marked,
};

use super::{describe, Node, ParseError};

/// Substrings that mark a count as a formula for the generation phase.
const FORMULA_MARKERS: [&str; 2] = ["<<", "="];

/// Interpret the `count` value of an object of type `ty`.
///
/// Numbers become a fixed count, reals truncated toward zero. Strings holding a formula
/// marker are kept as [Count::Deferred], other strings must hold an integer.
pub fn parse_count(ty: &TypeName, value: &Marked<Node>) -> Result<Count, ParseError> {
    let invalid = || ParseError::InvalidCount {
        ty: ty.clone(),
        found: describe(value),
        at: value.mark(),
    };

    let count = match &**value {
        Node::Integer(i) => Count::Fixed(u64::try_from(*i).map_err(|_| invalid())?),
        Node::Real(r) if r.is_finite() && *r >= 0.0 => Count::Fixed(r.trunc() as u64),
        Node::String(s) if FORMULA_MARKERS.iter().any(|m| s.contains(m)) => {
            Count::Deferred(s.clone())
        }
        Node::String(s) => Count::Fixed(s.trim().parse().map_err(|_| invalid())?),
        _ => return Err(invalid()),
    };

    trace!("Count of `{ty}` resolved to {count:?}");
    Ok(count)
}
