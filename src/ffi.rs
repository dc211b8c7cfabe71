//! FFI bindings for LightSpeed
//!
//! This module provides C-compatible functions for driving a processor from a
//! mobile host. Strings are null-terminated; returned strings are allocated
//! by Rust and must be freed by the caller using `lightspeed_free_string`.
//!
//! Audio playback stays on the host side: it registers a start and a stop
//! callback, which the trigger invokes synchronously from inside
//! `lightspeed_processor_on_position_fix` or `lightspeed_processor_set_audio_enabled`.

use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::audio::{AudioSink, PlaybackError};
use crate::kinematics::FirstFixPolicy;
use crate::pipeline::{ProcessorConfig, SpeedProcessor};
use crate::types::{AudioResource, Position, TriggerConfig};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

// ============================================================================
// Host audio callbacks
// ============================================================================

/// Start playback of `resource`. Return 0 on success, non-zero on failure.
pub type LightspeedStartCallback =
    extern "C" fn(user_data: *mut c_void, resource: *const c_char) -> i32;

/// Stop playback. Must be idempotent.
pub type LightspeedStopCallback = extern "C" fn(user_data: *mut c_void);

/// Audio sink that forwards to host callbacks
pub struct CallbackAudioSink {
    start: Option<LightspeedStartCallback>,
    stop: Option<LightspeedStopCallback>,
    user_data: *mut c_void,
}

impl Default for CallbackAudioSink {
    fn default() -> Self {
        Self {
            start: None,
            stop: None,
            user_data: ptr::null_mut(),
        }
    }
}

impl AudioSink for CallbackAudioSink {
    fn start(&mut self, resource: &AudioResource) -> Result<(), PlaybackError> {
        let Some(start) = self.start else {
            return Err(PlaybackError::Backend("no start callback registered".to_string()));
        };
        let reference = CString::new(resource.as_str())
            .map_err(|_| PlaybackError::ResourceUnavailable(resource.to_string()))?;

        match start(self.user_data, reference.as_ptr()) {
            0 => Ok(()),
            code => Err(PlaybackError::Backend(format!(
                "start callback returned {}",
                code
            ))),
        }
    }

    fn stop(&mut self) {
        if let Some(stop) = self.stop {
            stop(self.user_data);
        }
    }
}

// ============================================================================
// Stateful Processor API
// ============================================================================

/// Opaque handle to a SpeedProcessor
pub struct LightspeedProcessorHandle {
    processor: SpeedProcessor<CallbackAudioSink>,
}

fn into_handle(config: ProcessorConfig) -> *mut LightspeedProcessorHandle {
    let processor = SpeedProcessor::with_sink(config, CallbackAudioSink::default());
    Box::into_raw(Box::new(LightspeedProcessorHandle { processor }))
}

/// Create a new processor.
///
/// # Safety
/// - Returns a pointer to a newly allocated processor.
/// - Must be freed with `lightspeed_processor_free`.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_new(
    threshold_kmh: f64,
    enabled: i32,
    seed_first_fix: i32,
) -> *mut LightspeedProcessorHandle {
    clear_last_error();

    let config = ProcessorConfig {
        trigger: TriggerConfig {
            threshold_kmh,
            enabled: enabled != 0,
            ..Default::default()
        },
        first_fix: if seed_first_fix != 0 {
            FirstFixPolicy::SeedOnly
        } else {
            FirstFixPolicy::FromOrigin
        },
    };
    into_handle(config)
}

/// Create a new processor from a JSON `ProcessorConfig`.
///
/// # Safety
/// - `json` must be a valid null-terminated C string.
/// - Must be freed with `lightspeed_processor_free`.
/// - Returns NULL on error; call `lightspeed_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_new_with_config(
    json: *const c_char,
) -> *mut LightspeedProcessorHandle {
    clear_last_error();

    let json_str = match cstr_to_string(json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid config string pointer");
            return ptr::null_mut();
        }
    };

    match ProcessorConfig::from_json(&json_str) {
        Ok(config) => into_handle(config),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_free(processor: *mut LightspeedProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

/// Register host audio callbacks. Either callback may be NULL.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - `user_data` is passed back verbatim and must stay valid while the
///   processor may call the callbacks.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_set_audio_callbacks(
    processor: *mut LightspeedProcessorHandle,
    start: Option<LightspeedStartCallback>,
    stop: Option<LightspeedStopCallback>,
    user_data: *mut c_void,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let handle = &mut *processor;
    *handle.processor.sink_mut() = CallbackAudioSink {
        start,
        stop,
        user_data,
    };
    0
}

/// Feed one position fix and return the fix report as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - Returns a newly allocated string that must be freed with `lightspeed_free_string`.
/// - Returns NULL if the fix was dropped; call `lightspeed_last_error` for the reason.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_on_position_fix(
    processor: *mut LightspeedProcessorHandle,
    latitude: f64,
    longitude: f64,
    timestamp_ms: i64,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    let handle = &mut *processor;

    let report = match handle
        .processor
        .process_fix(Position::new(latitude, longitude, timestamp_ms))
    {
        Ok(report) => report,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match serde_json::to_string(&report) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Set the trigger threshold (km/h).
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_set_threshold_kmh(
    processor: *mut LightspeedProcessorHandle,
    threshold_kmh: f64,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    (*processor).processor.set_threshold_kmh(threshold_kmh);
    0
}

/// Enable or disable audio. Disabling invokes the stop callback if audio is active.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_set_audio_enabled(
    processor: *mut LightspeedProcessorHandle,
    enabled: i32,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    (*processor).processor.set_audio_enabled(enabled != 0);
    0
}

/// Select the audio resource, or clear it by passing NULL.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - `resource` must be NULL or a valid null-terminated UTF-8 C string.
/// - Returns 0 on success, non-zero on error.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_select_audio_resource(
    processor: *mut LightspeedProcessorHandle,
    resource: *const c_char,
) -> i32 {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return -1;
    }

    let selected = if resource.is_null() {
        None
    } else {
        match cstr_to_string(resource) {
            Some(s) => Some(AudioResource::new(s)),
            None => {
                set_last_error("Audio resource is not valid UTF-8");
                return -1;
            }
        }
    };

    (*processor).processor.select_audio_resource(selected);
    0
}

/// Current display readout as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `lightspeed_processor_new*`.
/// - Returns a newly allocated string that must be freed with `lightspeed_free_string`.
/// - Returns NULL on error; call `lightspeed_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_processor_snapshot_json(
    processor: *const LightspeedProcessorHandle,
) -> *mut c_char {
    clear_last_error();

    if processor.is_null() {
        set_last_error("Null processor pointer");
        return ptr::null_mut();
    }

    match serde_json::to_string(&(*processor).processor.snapshot()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by LightSpeed functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a LightSpeed function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next LightSpeed call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn lightspeed_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_M;

    #[derive(Default)]
    struct HostPlayer {
        starts: u32,
        stops: u32,
        last_resource: Option<String>,
        fail: bool,
    }

    extern "C" fn on_start(user_data: *mut c_void, resource: *const c_char) -> i32 {
        let player = unsafe { &mut *(user_data as *mut HostPlayer) };
        player.starts += 1;
        player.last_resource = unsafe { cstr_to_string(resource) };
        if player.fail {
            1
        } else {
            0
        }
    }

    extern "C" fn on_stop(user_data: *mut c_void) {
        let player = unsafe { &mut *(user_data as *mut HostPlayer) };
        player.stops += 1;
    }

    fn meters_north(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_M).to_degrees()
    }

    unsafe fn take_json(ptr: *mut c_char) -> serde_json::Value {
        assert!(!ptr.is_null());
        let value = serde_json::from_str(CStr::from_ptr(ptr).to_str().unwrap()).unwrap();
        lightspeed_free_string(ptr);
        value
    }

    #[test]
    fn test_ffi_processor_drives_host_callbacks() {
        let mut player = HostPlayer::default();

        unsafe {
            let processor = lightspeed_processor_new(10.0, 1, 1);
            assert!(!processor.is_null());

            let status = lightspeed_processor_set_audio_callbacks(
                processor,
                Some(on_start),
                Some(on_stop),
                &mut player as *mut HostPlayer as *mut c_void,
            );
            assert_eq!(status, 0);

            let song = CString::new("content://media/external/audio/9").unwrap();
            assert_eq!(lightspeed_processor_select_audio_resource(processor, song.as_ptr()), 0);

            take_json(lightspeed_processor_on_position_fix(processor, 0.0, 0.0, 0));
            // 20 m in 2 s = 36 km/h
            let report = take_json(lightspeed_processor_on_position_fix(
                processor,
                meters_north(20.0),
                0.0,
                2000,
            ));
            assert_eq!(report["action"], "start");
            assert_eq!(report["trigger_phase"], "active");

            assert_eq!(lightspeed_processor_set_audio_enabled(processor, 0), 0);

            let snapshot = take_json(lightspeed_processor_snapshot_json(processor));
            assert_eq!(snapshot["trigger_phase"], "idle");
            assert_eq!(snapshot["speed_kmh"], 36.0);

            lightspeed_processor_free(processor);
        }

        assert_eq!(player.starts, 1);
        assert_eq!(player.stops, 1);
        assert_eq!(
            player.last_resource.as_deref(),
            Some("content://media/external/audio/9")
        );
    }

    #[test]
    fn test_ffi_start_failure_is_reported_in_report() {
        let mut player = HostPlayer {
            fail: true,
            ..Default::default()
        };

        unsafe {
            let config = CString::new(
                r#"{"trigger": {"threshold_kmh": 5.0, "enabled": true, "audio_resource": "a.mp3"}, "first_fix": "seed_only"}"#,
            )
            .unwrap();
            let processor = lightspeed_processor_new_with_config(config.as_ptr());
            assert!(!processor.is_null());
            lightspeed_processor_set_audio_callbacks(
                processor,
                Some(on_start),
                None,
                &mut player as *mut HostPlayer as *mut c_void,
            );

            take_json(lightspeed_processor_on_position_fix(processor, 0.0, 0.0, 0));
            let report = take_json(lightspeed_processor_on_position_fix(
                processor,
                meters_north(20.0),
                0.0,
                2000,
            ));
            assert_eq!(report["trigger_phase"], "active");
            assert!(report["error"].as_str().unwrap().contains("start callback returned 1"));

            lightspeed_processor_free(processor);
        }

        assert_eq!(player.starts, 1);
    }

    #[test]
    fn test_ffi_invalid_fix_sets_error() {
        unsafe {
            let processor = lightspeed_processor_new(10.0, 0, 0);
            let result = lightspeed_processor_on_position_fix(processor, f64::NAN, 0.0, 1000);
            assert!(result.is_null());

            let error = lightspeed_last_error();
            assert!(!error.is_null());
            let error_str = CStr::from_ptr(error).to_str().unwrap();
            assert!(error_str.contains("latitude"));

            lightspeed_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_bad_config() {
        unsafe {
            let config = CString::new("not json").unwrap();
            let processor = lightspeed_processor_new_with_config(config.as_ptr());
            assert!(processor.is_null());
            assert!(!lightspeed_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_rejects_non_positive_grace() {
        unsafe {
            let config = CString::new(
                r#"{"trigger": {"threshold_kmh": 10.0, "grace_ms": -1, "enabled": true, "audio_resource": "a.mp3"}}"#,
            )
            .unwrap();
            let processor = lightspeed_processor_new_with_config(config.as_ptr());
            assert!(processor.is_null());

            let error = CStr::from_ptr(lightspeed_last_error()).to_str().unwrap();
            assert!(error.contains("grace_ms"));
        }
    }

    #[test]
    fn test_ffi_null_processor() {
        unsafe {
            assert_eq!(lightspeed_processor_set_threshold_kmh(ptr::null_mut(), 1.0), -1);
            assert!(lightspeed_processor_snapshot_json(ptr::null()).is_null());
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = lightspeed_version();
            assert!(!version.is_null());

            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert!(!version_str.is_empty());
        }
    }
}
