//! Stack item values.
//!
//! [`StackItem`] is the closed set of values scripts manipulate. Arrays are
//! shared by reference: cloning a `StackItem::Array` aliases the same cell, so
//! writes through one slot are visible through every other. Structs share the
//! same representation but are deep-cloned with [`StackItem::clone_struct`]
//! whenever they are stored into a container.
//!
//! Freeing, struct cloning and formatting never recurse on the native stack,
//! so nesting depth is bounded only by memory. An Array stored into itself is
//! an `Rc` cycle and stays allocated for the life of the host.

use crate::types::bytes::Bytes;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::host::InteropInterface;
use num_bigint::BigInt;
use num_traits::Zero;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// Containers nested deeper than this are printed as `[...]`.
pub const MAX_DISPLAY_DEPTH: usize = 32;

/// Shared, mutable element list of an Array or Struct.
///
/// Cloning aliases the same cell.
#[derive(Clone)]
pub struct Items(Rc<RefCell<Vec<StackItem>>>);

impl Items {
    pub fn new(items: Vec<StackItem>) -> Self {
        Items(Rc::new(RefCell::new(items)))
    }

    /// True when both handles alias the same cell.
    pub fn ptr_eq(&self, other: &Items) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> *const RefCell<Vec<StackItem>> {
        Rc::as_ptr(&self.0)
    }
}

impl Deref for Items {
    type Target = RefCell<Vec<StackItem>>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Drop for Items {
    /// The last owner unnests its elements into a worklist instead of letting
    /// each level drop the next.
    fn drop(&mut self) {
        let Some(cell) = Rc::get_mut(&mut self.0) else {
            return;
        };
        let mut pending = std::mem::take(cell.get_mut());
        while let Some(item) = pending.pop() {
            if let StackItem::Array(mut inner) | StackItem::Struct(mut inner) = item {
                if let Some(cell) = Rc::get_mut(&mut inner.0) {
                    pending.append(cell.get_mut());
                }
            }
        }
    }
}

#[derive(Clone)]
pub enum StackItem {
    Integer(BigInt),
    Boolean(bool),
    ByteArray(Bytes),
    Array(Items),
    Struct(Items),
    Interop(Rc<dyn InteropInterface>),
}

impl StackItem {
    /// Creates a new Array holding `items`.
    pub fn array(items: Vec<StackItem>) -> Self {
        StackItem::Array(Items::new(items))
    }

    /// Creates a new Struct holding `items`.
    pub fn structure(items: Vec<StackItem>) -> Self {
        StackItem::Struct(Items::new(items))
    }

    pub fn interop(object: Rc<dyn InteropInterface>) -> Self {
        StackItem::Interop(object)
    }

    /// Variant name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            StackItem::Integer(_) => "Integer",
            StackItem::Boolean(_) => "Boolean",
            StackItem::ByteArray(_) => "ByteArray",
            StackItem::Array(_) => "Array",
            StackItem::Struct(_) => "Struct",
            StackItem::Interop(_) => "Interop",
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, StackItem::Struct(_))
    }

    /// Element cell of an Array or Struct.
    pub fn items(&self) -> Option<&Items> {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => Some(items),
            _ => None,
        }
    }

    /// Integer view: bytes are read as little-endian two's complement.
    pub fn to_integer(&self) -> Result<BigInt, VMError> {
        match self {
            StackItem::Integer(value) => Ok(value.clone()),
            StackItem::Boolean(value) => Ok(BigInt::from(u8::from(*value))),
            StackItem::ByteArray(bytes) => Ok(BigInt::from_signed_bytes_le(bytes)),
            other => Err(other.mismatch("Integer")),
        }
    }

    /// Boolean view. Containers and host objects are always true.
    pub fn to_bool(&self) -> bool {
        match self {
            StackItem::Integer(value) => !value.is_zero(),
            StackItem::Boolean(value) => *value,
            StackItem::ByteArray(bytes) => bytes.iter().any(|b| *b != 0),
            StackItem::Array(_) | StackItem::Struct(_) | StackItem::Interop(_) => true,
        }
    }

    /// Byte view. Integers use the minimal little-endian two's complement form.
    pub fn to_bytes(&self) -> Result<Bytes, VMError> {
        match self {
            StackItem::Integer(value) => Ok(Bytes::new(integer_to_bytes(value))),
            StackItem::Boolean(value) => Ok(Bytes::new([u8::from(*value)])),
            StackItem::ByteArray(bytes) => Ok(bytes.clone()),
            other => Err(other.mismatch("ByteArray")),
        }
    }

    /// Downcasts a host object to a concrete type.
    pub fn as_interface<T: InteropInterface>(&self) -> Option<&T> {
        match self {
            StackItem::Interop(object) => {
                let any: &dyn Any = &**object;
                any.downcast_ref::<T>()
            }
            _ => None,
        }
    }

    /// Copy suitable for storing into a container.
    ///
    /// Structs (and structs nested in them) are copied element by element;
    /// every other variant, Arrays included, is shared.
    pub fn clone_struct(&self) -> StackItem {
        let StackItem::Struct(root) = self else {
            return self.clone();
        };
        let copy = Items::new(Vec::new());
        let mut pending = vec![(root.clone(), copy.clone())];
        while let Some((source, target)) = pending.pop() {
            let items: Vec<StackItem> = source
                .borrow()
                .iter()
                .map(|item| match item {
                    StackItem::Struct(inner) => {
                        let fresh = Items::new(Vec::new());
                        pending.push((inner.clone(), fresh.clone()));
                        StackItem::Struct(fresh)
                    }
                    other => other.clone(),
                })
                .collect();
            *target.borrow_mut() = items;
        }
        StackItem::Struct(copy)
    }

    /// `EQUAL` semantics.
    ///
    /// Integers compare numerically with each other. Integer, Boolean and
    /// ByteArray otherwise compare their byte views. Arrays, Structs and host
    /// objects compare by identity.
    pub fn equals(&self, other: &StackItem) -> bool {
        match (self, other) {
            (StackItem::Integer(a), StackItem::Integer(b)) => a == b,
            (StackItem::Array(a), StackItem::Array(b)) => a.ptr_eq(b),
            (StackItem::Struct(a), StackItem::Struct(b)) => a.ptr_eq(b),
            (StackItem::Interop(a), StackItem::Interop(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            (StackItem::Array(_) | StackItem::Struct(_) | StackItem::Interop(_), _) => false,
            (a, b) => match (a.to_bytes(), b.to_bytes()) {
                (Ok(x), Ok(y)) => x == y,
                _ => false,
            },
        }
    }

    fn mismatch(&self, expected: &'static str) -> VMError {
        VMError::TypeMismatch {
            instruction: "convert",
            expected,
            actual: self.type_name(),
        }
    }
}

/// Minimal little-endian two's complement; zero encodes as a single `0x00`.
pub fn integer_to_bytes(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return vec![0];
    }
    value.to_signed_bytes_le()
}

impl StackItem {
    /// Shared body of `Debug` and `Display`.
    ///
    /// `open` holds the containers currently being printed; a container that
    /// reaches one of them again, or lies deeper than [`MAX_DISPLAY_DEPTH`],
    /// prints as `[...]`.
    fn render(
        &self,
        f: &mut fmt::Formatter<'_>,
        debug: bool,
        open: &mut Vec<*const RefCell<Vec<StackItem>>>,
    ) -> fmt::Result {
        let (items, name, left, right) = match self {
            StackItem::Array(items) => (items, "Array", "[", "]"),
            StackItem::Struct(items) => (items, "Struct", "{", "}"),
            StackItem::Integer(value) if debug => return write!(f, "Integer({value})"),
            StackItem::Boolean(value) if debug => return write!(f, "Boolean({value})"),
            StackItem::ByteArray(bytes) if debug => return write!(f, "ByteArray({bytes})"),
            StackItem::Interop(object) if debug => {
                return write!(f, "Interop({})", object.interface_name());
            }
            StackItem::Integer(value) => return write!(f, "{value}"),
            StackItem::Boolean(value) => return write!(f, "{value}"),
            StackItem::ByteArray(bytes) => return write!(f, "{bytes}"),
            StackItem::Interop(object) => return write!(f, "<{}>", object.interface_name()),
        };

        if debug {
            write!(f, "{name}(")?;
        }
        if open.len() >= MAX_DISPLAY_DEPTH || open.contains(&items.addr()) {
            write!(f, "{left}...{right}")?;
        } else {
            open.push(items.addr());
            write!(f, "{left}")?;
            for (i, item) in items.borrow().iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                item.render(f, debug, open)?;
            }
            write!(f, "{right}")?;
            open.pop();
        }
        if debug {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Debug for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, true, &mut Vec::new())
    }
}

impl fmt::Display for StackItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, false, &mut Vec::new())
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        StackItem::Integer(value)
    }
}

impl From<i64> for StackItem {
    fn from(value: i64) -> Self {
        StackItem::Integer(BigInt::from(value))
    }
}

impl From<i32> for StackItem {
    fn from(value: i32) -> Self {
        StackItem::Integer(BigInt::from(value))
    }
}

impl From<usize> for StackItem {
    fn from(value: usize) -> Self {
        StackItem::Integer(BigInt::from(value))
    }
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::Boolean(value)
    }
}

impl From<Bytes> for StackItem {
    fn from(value: Bytes) -> Self {
        StackItem::ByteArray(value)
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        StackItem::ByteArray(Bytes::new(value))
    }
}

impl From<&[u8]> for StackItem {
    fn from(value: &[u8]) -> Self {
        StackItem::ByteArray(Bytes::new(value))
    }
}

impl<const N: usize> From<[u8; N]> for StackItem {
    fn from(value: [u8; N]) -> Self {
        StackItem::ByteArray(Bytes::new(value))
    }
}

impl From<Vec<StackItem>> for StackItem {
    fn from(items: Vec<StackItem>) -> Self {
        StackItem::array(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Handle(u32);

    impl InteropInterface for Handle {}

    #[test]
    fn integer_bytes_are_minimal_twos_complement() {
        assert_eq!(integer_to_bytes(&BigInt::from(0)), vec![0x00]);
        assert_eq!(integer_to_bytes(&BigInt::from(1)), vec![0x01]);
        assert_eq!(integer_to_bytes(&BigInt::from(-1)), vec![0xff]);
        assert_eq!(integer_to_bytes(&BigInt::from(128)), vec![0x80, 0x00]);
        assert_eq!(integer_to_bytes(&BigInt::from(-129)), vec![0x7f, 0xff]);
        assert_eq!(integer_to_bytes(&BigInt::from(256)), vec![0x00, 0x01]);
    }

    #[test]
    fn bytes_to_integer() {
        let item = StackItem::from(vec![0x00u8, 0x01]);
        assert_eq!(item.to_integer().unwrap(), BigInt::from(256));
        assert_eq!(StackItem::from(vec![0xffu8]).to_integer().unwrap(), BigInt::from(-1));
        assert_eq!(StackItem::from(Vec::<u8>::new()).to_integer().unwrap(), BigInt::from(0));
    }

    #[test]
    fn boolean_conversions() {
        assert_eq!(StackItem::from(true).to_bytes().unwrap().as_slice(), &[1]);
        assert_eq!(StackItem::from(false).to_bytes().unwrap().as_slice(), &[0]);
        assert_eq!(StackItem::from(true).to_integer().unwrap(), BigInt::from(1));
        assert!(!StackItem::from(vec![0u8, 0]).to_bool());
        assert!(StackItem::from(vec![0u8, 1]).to_bool());
        assert!(!StackItem::from(Vec::<u8>::new()).to_bool());
        assert!(!StackItem::from(0i64).to_bool());
        assert!(StackItem::array(vec![]).to_bool());
    }

    #[test]
    fn containers_have_no_scalar_views() {
        let array = StackItem::array(vec![1i64.into()]);
        assert!(matches!(
            array.to_integer(),
            Err(VMError::TypeMismatch { actual: "Array", .. })
        ));
        assert!(array.to_bytes().is_err());
        let handle = StackItem::interop(Rc::new(Handle(1)));
        assert!(handle.to_bytes().is_err());
    }

    #[test]
    fn equality_across_scalars() {
        assert!(StackItem::from(5i64).equals(&StackItem::from(5i64)));
        assert!(StackItem::from(1i64).equals(&StackItem::from(true)));
        assert!(StackItem::from(vec![0x01u8]).equals(&StackItem::from(true)));
        assert!(StackItem::from(0i64).equals(&StackItem::from(vec![0x00u8])));
        // same number, different byte forms
        assert!(!StackItem::from(vec![0x01u8, 0x00]).equals(&StackItem::from(1i64)));
        assert!(StackItem::from(BigInt::from(7)).equals(&StackItem::from(7i64)));
        assert!(!StackItem::from(1i64).equals(&StackItem::array(vec![])));
    }

    #[test]
    fn containers_compare_by_identity() {
        let a = StackItem::array(vec![1i64.into()]);
        let b = StackItem::array(vec![1i64.into()]);
        assert!(a.equals(&a.clone()));
        assert!(!a.equals(&b));

        let s = StackItem::structure(vec![]);
        assert!(s.equals(&s.clone()));
        assert!(!s.equals(&s.clone_struct()));
    }

    #[test]
    fn interop_identity_and_downcast() {
        let object: Rc<dyn InteropInterface> = Rc::new(Handle(7));
        let a = StackItem::interop(object.clone());
        let b = StackItem::interop(object);
        let c = StackItem::interop(Rc::new(Handle(7)));
        assert!(a.equals(&b));
        assert!(!a.equals(&c));
        assert_eq!(a.as_interface::<Handle>().map(|h| h.0), Some(7));
    }

    #[test]
    fn clone_struct_is_deep_for_structs_only() {
        let inner_array = StackItem::array(vec![1i64.into()]);
        let inner_struct = StackItem::structure(vec![2i64.into()]);
        let outer = StackItem::structure(vec![inner_array.clone(), inner_struct.clone()]);

        let copy = outer.clone_struct();
        let copy_items = copy.items().unwrap().borrow();
        assert!(copy_items[0].equals(&inner_array));
        assert!(!copy_items[1].equals(&inner_struct));

        let array = StackItem::array(vec![]);
        assert!(array.clone_struct().equals(&array));
    }

    #[test]
    fn display_nested() {
        let item = StackItem::array(vec![
            1i64.into(),
            true.into(),
            StackItem::from(vec![0xabu8]),
            StackItem::structure(vec![]),
        ]);
        assert_eq!(item.to_string(), "[1, true, 0xab, {}]");
        assert_eq!(
            format!("{:?}", StackItem::structure(vec![1i64.into()])),
            "Struct({Integer(1)})"
        );
    }

    fn nest(levels: usize) -> StackItem {
        let mut item = StackItem::array(vec![]);
        for _ in 0..levels {
            item = StackItem::array(vec![item]);
        }
        item
    }

    #[test]
    fn deep_nesting_drops_without_recursion() {
        drop(nest(200_000));

        let mut item = StackItem::structure(vec![]);
        for _ in 0..200_000 {
            item = StackItem::structure(vec![item, 1i64.into()]);
        }
        drop(item);
    }

    #[test]
    fn drop_keeps_shared_inner_containers() {
        let shared = StackItem::array(vec![7i64.into()]);
        drop(StackItem::array(vec![StackItem::array(vec![shared.clone()])]));
        let items = shared.items().unwrap().borrow();
        assert_eq!(items.len(), 1);
        assert!(items[0].equals(&StackItem::from(7i64)));
    }

    #[test]
    fn clone_struct_handles_deep_nesting() {
        let mut item = StackItem::structure(vec![]);
        for _ in 0..100_000 {
            item = StackItem::structure(vec![item]);
        }
        let copy = item.clone_struct();
        assert!(!copy.equals(&item));
        let original_inner = item.items().unwrap().borrow()[0].clone();
        let copied_inner = copy.items().unwrap().borrow()[0].clone();
        assert!(copied_inner.is_struct());
        assert!(!copied_inner.equals(&original_inner));
    }

    #[test]
    fn self_containing_array_prints() {
        let array = StackItem::array(vec![1i64.into(), false.into()]);
        array.items().unwrap().borrow_mut()[1] = array.clone();
        assert_eq!(array.to_string(), "[1, [...]]");
        assert_eq!(format!("{array:?}"), "Array([Integer(1), Array([...])])");
    }

    #[test]
    fn deep_nesting_prints_truncated() {
        let text = nest(100_000).to_string();
        assert!(text.starts_with(&"[".repeat(MAX_DISPLAY_DEPTH)));
        assert!(text.contains("[...]"));
        assert_eq!(text.matches('[').count(), MAX_DISPLAY_DEPTH + 1);
    }
}
