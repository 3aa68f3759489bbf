use std::{ffi::c_void, marker::PhantomData};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FnPtrError {
    #[error("Function pointer is NULL")]
    FunctionPtrIsNull,

    #[error("Function pointer type has wrong size: {0} bytes (expected {1})")]
    FunctionPtrSize(usize, usize),
}

pub type FnPtrResult<T> = std::result::Result<T, FnPtrError>;

/// Typed wrapper around a raw code address.
///
/// `T` must be a function pointer type such as `unsafe extern "C" fn(...)`.
/// The wrapper only checks that `T` is pointer sized and that the address is
/// not null; matching the real signature is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FnPtr<T: Copy + 'static> {
    raw_ptr: *mut c_void,
    _phantom: PhantomData<T>,
}

// Safety: the wrapper holds a code address only, which is immutable
unsafe impl<T: Copy + 'static> Send for FnPtr<T> {}
unsafe impl<T: Copy + 'static> Sync for FnPtr<T> {}

impl<T: Copy + 'static> FnPtr<T> {
    /// Creates a new FnPtr from a raw code address.
    ///
    /// # Safety
    /// `raw_ptr` must point to a function whose signature is `T` and
    /// stay valid for as long as the result is used.
    pub unsafe fn from_raw(raw_ptr: *mut c_void) -> FnPtrResult<Self> {
        Self::validate_size()?;

        if raw_ptr.is_null() {
            return Err(FnPtrError::FunctionPtrIsNull);
        }

        Ok(Self {
            raw_ptr,
            _phantom: PhantomData,
        })
    }

    /// Creates a FnPtr from a function pointer value.
    pub fn from_fn(function: T) -> FnPtrResult<Self> {
        Self::validate_size()?;

        // Safety: validate_size guarantees T is exactly pointer sized
        let addr = unsafe { std::mem::transmute_copy::<T, usize>(&function) };

        if addr == 0 {
            return Err(FnPtrError::FunctionPtrIsNull);
        }

        Ok(Self {
            raw_ptr: addr as *mut c_void,
            _phantom: PhantomData,
        })
    }

    /// Converts the stored address back to the function type.
    ///
    /// # Safety
    /// Same as [`FnPtr::from_raw`]: the address must really be a `T`.
    pub unsafe fn as_fn(&self) -> T {
        let addr = self.raw_ptr as usize;

        // Safety: size checked on construction
        unsafe { std::mem::transmute_copy::<usize, T>(&addr) }
    }

    pub fn as_raw_ptr(&self) -> *mut c_void {
        self.raw_ptr
    }

    fn validate_size() -> FnPtrResult<()> {
        let type_size = std::mem::size_of::<T>();
        let ptr_size = std::mem::size_of::<usize>();

        if type_size != ptr_size {
            return Err(FnPtrError::FunctionPtrSize(type_size, ptr_size));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn answer() -> i32 {
        42
    }

    #[test]
    fn test_from_fn_round_trip() {
        let ptr = FnPtr::<extern "C" fn() -> i32>::from_fn(answer).unwrap();
        assert_eq!(ptr.as_raw_ptr(), answer as *mut c_void);

        let f = unsafe { ptr.as_fn() };
        assert_eq!(f(), 42);
    }

    #[test]
    fn test_null_is_rejected() {
        let result = unsafe { FnPtr::<extern "C" fn() -> i32>::from_raw(std::ptr::null_mut()) };
        assert!(matches!(result, Err(FnPtrError::FunctionPtrIsNull)));
    }

    #[test]
    fn test_wrong_size_is_rejected() {
        let result = FnPtr::<(usize, usize)>::from_fn((1, 2));
        assert!(matches!(result, Err(FnPtrError::FunctionPtrSize(_, _))));
    }
}
