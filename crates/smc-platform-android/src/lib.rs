//! SMC Platform Android - native library behind the messenger app.
//!
//! `boundary` holds the host contract and is usable on any target, which is
//! how it is tested. The JNI exports wrapping it compile only for Android.

pub mod boundary;
mod error;

pub use boundary::HostContext;
pub use error::BoundaryError;

// JNI bindings - only compile on Android targets
#[cfg(target_os = "android")]
mod jni_bindings;
