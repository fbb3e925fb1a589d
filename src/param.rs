use std::any::Any;

use smallvec::SmallVec;

/// Inline capacity for [`Param::Bytes`] before a push is rejected with
/// `QueueError::ParamTooLarge`. Events declared without a parameter type
/// never carry one.
pub const STATIC_PARAM_INLINE: usize = 32;

/// An event's optional payload.
///
/// Collapses the C library's STATIC/DYNAMIC build-time modes into a single
/// runtime enum: `Bytes` is the no-extra-allocation value-semantics mode,
/// `Boxed` is the owning/destructor mode. `None` is distinct from an empty
/// `Bytes` so a handler that declared no parameter never has to guess
/// whether bytes are meaningful.
pub enum Param {
    None,
    Bytes(SmallVec<[u8; STATIC_PARAM_INLINE]>),
    Boxed(Box<dyn Any + Send>),
}

impl Param {
    pub fn bytes(data: &[u8]) -> Self {
        Param::Bytes(SmallVec::from_slice(data))
    }

    pub fn boxed<T: Any + Send>(value: T) -> Self {
        Param::Boxed(Box::new(value))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Param::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Param::Boxed(b) => b.downcast_ref::<T>(),
            _ => None,
        }
    }

    pub(crate) fn byte_len(&self) -> usize {
        match self {
            Param::Bytes(b) => b.len(),
            _ => 0,
        }
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::None => write!(f, "Param::None"),
            Param::Bytes(b) => write!(f, "Param::Bytes({} bytes)", b.len()),
            Param::Boxed(_) => write!(f, "Param::Boxed(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_carries_no_bytes_and_downcasts_to_nothing() {
        let p = Param::None;
        assert_eq!(p.as_bytes(), None);
        assert_eq!(p.byte_len(), 0);
        assert_eq!(p.downcast_ref::<u32>(), None);
    }

    #[test]
    fn bytes_round_trips_through_as_bytes_and_byte_len() {
        let p = Param::bytes(&[1, 2, 3]);
        assert_eq!(p.as_bytes(), Some(&[1u8, 2, 3][..]));
        assert_eq!(p.byte_len(), 3);
        assert_eq!(p.downcast_ref::<u32>(), None, "Bytes never downcasts");
    }

    #[test]
    fn boxed_downcasts_to_its_concrete_type_and_not_others() {
        let p = Param::boxed(7u32);
        assert_eq!(p.downcast_ref::<u32>(), Some(&7));
        assert_eq!(p.downcast_ref::<i64>(), None);
        assert_eq!(p.as_bytes(), None);
        assert_eq!(p.byte_len(), 0);
    }

    #[test]
    fn debug_never_exposes_boxed_payload_contents() {
        assert_eq!(format!("{:?}", Param::None), "Param::None");
        assert_eq!(format!("{:?}", Param::bytes(&[0; 4])), "Param::Bytes(4 bytes)");
        assert_eq!(format!("{:?}", Param::boxed(1i32)), "Param::Boxed(..)");
    }
}
