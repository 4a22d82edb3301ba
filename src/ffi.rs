//! FFI bindings for LearnLens
//!
//! This module provides C-compatible functions for calling LearnLens from other languages.
//! All functions use C strings (null-terminated) and return allocated memory that
//! must be freed by the caller using `learnlens_free_string`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::{AnalyticsConfig, DEFAULT_KMEANS_MAX_ITERATIONS};
use crate::error::AnalyticsError;
use crate::kmeans::{FeatureMatrix, KMeans};
use crate::pipeline::{factor_analysis_from_json, AnalyticsProcessor};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Hand a JSON result to the caller, or record the error and return NULL
fn into_c_result(result: Result<String, AnalyticsError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Seeded generator for a non-negative seed, entropy otherwise
fn rng_from_seed(seed: i64) -> StdRng {
    if seed >= 0 {
        StdRng::seed_from_u64(seed as u64)
    } else {
        StdRng::from_entropy()
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Run factor analysis over a JSON log payload and return the result as JSON.
///
/// # Safety
/// - `logs_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `learnlens_free_string`.
/// - Returns NULL on error; call `learnlens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn learnlens_factor_analysis(logs_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(logs_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    into_c_result(
        factor_analysis_from_json(&json_str, &AnalyticsConfig::default())
            .and_then(|result| serde_json::to_string(&result).map_err(AnalyticsError::from)),
    )
}

/// Cluster factor scores (`learner -> { axis: number }`) into `k` groups.
///
/// A `max_iterations` of 0 or less uses the default cap; a negative `seed`
/// seeds from entropy.
///
/// # Safety
/// - `scores_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `learnlens_free_string`.
/// - Returns NULL on error; call `learnlens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn learnlens_kmeans(
    scores_json: *const c_char,
    k: i32,
    max_iterations: i32,
    seed: i64,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(scores_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let max_iterations = if max_iterations <= 0 {
        DEFAULT_KMEANS_MAX_ITERATIONS
    } else {
        max_iterations as usize
    };
    let mut rng = rng_from_seed(seed);

    let result = FeatureMatrix::from_json(&json_str).and_then(|features| {
        KMeans::new(k.max(0) as usize)
            .with_max_iterations(max_iterations)
            .fit(&features, &mut rng)
    });

    into_c_result(result.and_then(|clusters| {
        serde_json::to_string(&clusters).map_err(AnalyticsError::from)
    }))
}

/// Run the full pipeline and return the report as JSON.
///
/// A `k` of 0 or less skips clustering; a negative `seed` seeds from entropy.
///
/// # Safety
/// - `logs_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `learnlens_free_string`.
/// - Returns NULL on error; call `learnlens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn learnlens_analyze(
    logs_json: *const c_char,
    k: i32,
    seed: i64,
) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(logs_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let config = AnalyticsConfig {
        seed: (seed >= 0).then_some(seed as u64),
        ..AnalyticsConfig::default()
    };
    let mut processor = AnalyticsProcessor::with_config(config);
    let k = (k > 0).then_some(k as usize);

    into_c_result(processor.analyze_to_json(&json_str, k))
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to an AnalyticsProcessor
pub struct AnalyticsProcessorHandle {
    processor: AnalyticsProcessor,
}

/// Create a new AnalyticsProcessor from a JSON configuration.
///
/// # Safety
/// - `config_json` must be NULL (defaults) or a valid null-terminated C string.
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `learnlens_processor_free`.
/// - Returns NULL on error; call `learnlens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn learnlens_processor_new(
    config_json: *const c_char,
) -> *mut AnalyticsProcessorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        AnalyticsConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match AnalyticsConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    let processor = AnalyticsProcessor::with_config(config);
    let handle = Box::new(AnalyticsProcessorHandle { processor });
    Box::into_raw(handle)
}

/// Free an AnalyticsProcessor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `learnlens_processor_new`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn learnlens_processor_free(processor: *mut AnalyticsProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Run the full pipeline with a stateful processor.
///
/// Consecutive calls draw from the processor's random stream.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `learnlens_processor_new`.
/// - `logs_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `learnlens_free_string`.
/// - Returns NULL on error; call `learnlens_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn learnlens_processor_analyze(
    processor: *mut AnalyticsProcessorHandle,
    logs_json: *const c_char,
    k: i32,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let json_str = match cstr_to_string(logs_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid JSON string pointer");
            return ptr::null_mut();
        }
    };

    let k = (k > 0).then_some(k as usize);
    into_c_result(handle.processor.analyze_to_json(&json_str, k))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by LearnLens functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a LearnLens function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn learnlens_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next LearnLens function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn learnlens_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the LearnLens library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn learnlens_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::ffi::CString;

    fn sample_logs_json() -> CString {
        let mut logs = Vec::new();
        for i in 0..10 {
            let user = format!("learner-{}", i);
            for attempt in 0..2 {
                let response_time = 1.5 + (i as f64) * 0.7 + attempt as f64;
                let clicks = vec![0; (i % 3) + 1];
                logs.push(json!({
                    "user_id": user,
                    "correct": (i + attempt) % 2 == 0,
                    "response_time": response_time,
                    "clicks": clicks,
                    "confidence": ((i % 4) as f64) * 0.25,
                }));
            }
        }
        CString::new(json!({ "logs": logs }).to_string()).unwrap()
    }

    unsafe fn take_json(ptr: *mut c_char) -> Value {
        assert!(!ptr.is_null());
        let value = serde_json::from_str(CStr::from_ptr(ptr).to_str().unwrap()).unwrap();
        learnlens_free_string(ptr);
        value
    }

    #[test]
    fn test_ffi_factor_analysis() {
        let logs = sample_logs_json();

        unsafe {
            let result = take_json(learnlens_factor_analysis(logs.as_ptr()));
            assert_eq!(result["eigenvalues"].as_array().unwrap().len(), 8);
            assert!(result["num_factors"].as_u64().unwrap() >= 1);
            assert_eq!(result["factor_scores"].as_object().unwrap().len(), 10);
        }
    }

    #[test]
    fn test_ffi_kmeans_is_reproducible() {
        let scores = CString::new(
            r#"{"a": {"F1": 0.0}, "b": {"F1": 0.1}, "c": {"F1": 9.9}, "d": {"F1": 10.0}}"#,
        )
        .unwrap();

        unsafe {
            let first = take_json(learnlens_kmeans(scores.as_ptr(), 2, 0, 7));
            let second = take_json(learnlens_kmeans(scores.as_ptr(), 2, 0, 7));
            assert_eq!(first, second);
            assert_eq!(first["labels"]["a"], first["labels"]["b"]);
            assert_ne!(first["labels"]["a"], first["labels"]["c"]);
        }
    }

    #[test]
    fn test_ffi_analyze_with_clustering() {
        let logs = sample_logs_json();

        unsafe {
            let report = take_json(learnlens_analyze(logs.as_ptr(), 3, 42));
            assert_eq!(report["producer"]["name"], "learnlens");
            assert_eq!(report["learner_count"], 10);
            assert_eq!(report["clustering"]["k"], 3);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let config = CString::new(r#"{"seed": 11}"#).unwrap();
            let processor = learnlens_processor_new(config.as_ptr());
            assert!(!processor.is_null());

            let logs = sample_logs_json();
            let report = take_json(learnlens_processor_analyze(processor, logs.as_ptr(), 2));
            assert_eq!(report["clustering"]["k"], 2);

            let without_clusters =
                take_json(learnlens_processor_analyze(processor, logs.as_ptr(), 0));
            assert!(without_clusters.get("clustering").is_none());

            learnlens_processor_free(processor);

            let defaults = learnlens_processor_new(ptr::null());
            assert!(!defaults.is_null());
            learnlens_processor_free(defaults);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let invalid_json = CString::new("not json").unwrap();
            let result = learnlens_factor_analysis(invalid_json.as_ptr());
            assert!(result.is_null());

            let error = learnlens_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("Invalid JSON"));

            let scores = CString::new(r#"{"a": {"F1": 1.0}}"#).unwrap();
            assert!(learnlens_kmeans(scores.as_ptr(), 5, 10, 1).is_null());
            let error_str = CStr::from_ptr(learnlens_last_error()).to_str().unwrap();
            assert!(error_str.contains("k=5"));

            let bad_config = CString::new(r#"{"jacobi_tolerance": 0.0}"#).unwrap();
            assert!(learnlens_processor_new(bad_config.as_ptr()).is_null());
            assert!(!learnlens_last_error().is_null());

            assert!(learnlens_analyze(ptr::null(), 2, 1).is_null());
        }
    }

    #[test]
    fn test_ffi_last_error_cleared_on_success() {
        unsafe {
            let invalid_json = CString::new("{").unwrap();
            assert!(learnlens_factor_analysis(invalid_json.as_ptr()).is_null());

            let empty = CString::new("[]").unwrap();
            let result = take_json(learnlens_factor_analysis(empty.as_ptr()));
            assert_eq!(result["num_factors"], 0);
            assert!(learnlens_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = learnlens_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, crate::LEARNLENS_VERSION);
        }
    }
}
