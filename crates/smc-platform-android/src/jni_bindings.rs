//! JNI exports for `com.example.securemessenger.rust.Core`.
//!
//! The Kotlin side is an `object`, so every native receives the singleton
//! instance as `this`. Network calls block; the app invokes them from
//! background workers.

use jni::objects::{JObject, JString};
use jni::sys::{jboolean, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;

use crate::boundary;
use crate::error::BoundaryError;

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

fn read_string(env: &mut JNIEnv, value: &JString) -> Result<String, BoundaryError> {
    env.get_string(value)
        .map(Into::into)
        .map_err(|e| BoundaryError::InvalidInput(format!("invalid string argument: {e}")))
}

fn new_string(env: &mut JNIEnv, value: &str) -> jstring {
    match env.new_string(value) {
        Ok(s) => s.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn throw(env: &mut JNIEnv, error: &BoundaryError) {
    let _ = env.throw_new(error.java_class(), error.to_string());
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_init(
    _env: JNIEnv,
    _this: JObject,
) -> jboolean {
    to_jboolean(boundary::init())
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_sendMessage(
    mut env: JNIEnv,
    _this: JObject,
    chat_id: jlong,
    text: JString,
) -> jboolean {
    match read_string(&mut env, &text) {
        Ok(text) => to_jboolean(boundary::send_message(chat_id, &text)),
        Err(_) => JNI_FALSE,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_checkForUpdates(
    mut env: JNIEnv,
    _this: JObject,
) -> jstring {
    let json = boundary::check_for_updates();
    new_string(&mut env, &json)
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_connectObfs4(
    mut env: JNIEnv,
    _this: JObject,
    bridge_addr: JString,
    public_key: JString,
) -> jboolean {
    let args = read_string(&mut env, &bridge_addr)
        .and_then(|addr| Ok((addr, read_string(&mut env, &public_key)?)));
    match args {
        Ok((addr, key)) => to_jboolean(boundary::connect_obfs4(&addr, &key)),
        Err(_) => JNI_FALSE,
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_checkBlockage(
    mut env: JNIEnv,
    _this: JObject,
    target: JString,
) -> jstring {
    let verdict = match read_string(&mut env, &target) {
        Ok(target) => boundary::check_blockage(&target),
        Err(_) => "unknown".to_string(),
    };
    new_string(&mut env, &verdict)
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_generateKeyPair(
    mut env: JNIEnv,
    _this: JObject,
) -> jstring {
    match boundary::generate_key_pair() {
        Ok(pair) => new_string(&mut env, &pair),
        Err(e) => {
            // The exception takes precedence over the return value.
            throw(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_signMessage(
    mut env: JNIEnv,
    _this: JObject,
    message: JString,
    secret_key: JString,
) -> jstring {
    let result = || -> Result<String, BoundaryError> {
        let message = read_string(&mut env, &message)?;
        let secret_key = read_string(&mut env, &secret_key)?;
        boundary::sign_message(&message, &secret_key)
    }();

    match result {
        Ok(signature) => new_string(&mut env, &signature),
        Err(e) => {
            throw(&mut env, &e);
            std::ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_com_example_securemessenger_rust_Core_verifySignature(
    mut env: JNIEnv,
    _this: JObject,
    message: JString,
    signature: JString,
    public_key: JString,
) -> jboolean {
    let result = || -> Result<bool, BoundaryError> {
        let message = read_string(&mut env, &message)?;
        let signature = read_string(&mut env, &signature)?;
        let public_key = read_string(&mut env, &public_key)?;
        boundary::verify_signature(&message, &signature, &public_key)
    }();

    match result {
        Ok(valid) => to_jboolean(valid),
        Err(e) => {
            throw(&mut env, &e);
            JNI_FALSE
        }
    }
}
