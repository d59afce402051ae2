//! Bindings to the vendor C wrappers `libg1_loco_wrapper` and
//! `libg1_arm_wrapper` (feature `native`).
//!
//! `build.rs` adds `G1BRIDGE_NATIVE_LIB_DIR` to the link search path.  The
//! wrappers catch every SDK exception and report it as code `-1`, so no
//! unwinding ever crosses this boundary.

use std::ffi::{CStr, CString, c_char, c_int, c_void};

use g1bridge_types::Domain;
use tracing::warn;

use crate::native::{ArmNative, LocoNative, NativeReply, NativeSession, RawHandle};

mod sys {
    use std::ffi::{c_char, c_float, c_int, c_void};

    #[repr(C)]
    pub struct IntResult {
        pub code: c_int,
        pub value: c_int,
    }

    #[repr(C)]
    pub struct FloatResult {
        pub code: c_int,
        pub value: c_float,
    }

    #[repr(C)]
    pub struct StringResult {
        pub code: c_int,
        pub data: *mut c_char,
    }

    #[link(name = "g1_loco_wrapper")]
    unsafe extern "C" {
        pub fn create_loco_client(network_interface: *const c_char) -> *mut c_void;
        pub fn destroy_loco_client(handle: *mut c_void);
        pub fn init_loco_client(handle: *mut c_void) -> c_int;
        pub fn set_timeout(handle: *mut c_void, timeout: c_float) -> c_int;

        pub fn get_fsm_id(handle: *mut c_void) -> IntResult;
        pub fn get_fsm_mode(handle: *mut c_void) -> IntResult;
        pub fn get_balance_mode(handle: *mut c_void) -> IntResult;
        pub fn get_swing_height(handle: *mut c_void) -> FloatResult;
        pub fn get_stand_height(handle: *mut c_void) -> FloatResult;

        pub fn set_fsm_id(handle: *mut c_void, fsm_id: c_int) -> c_int;
        pub fn set_balance_mode(handle: *mut c_void, balance_mode: c_int) -> c_int;
        pub fn set_swing_height(handle: *mut c_void, swing_height: c_float) -> c_int;
        pub fn set_stand_height(handle: *mut c_void, stand_height: c_float) -> c_int;
        pub fn set_velocity(handle: *mut c_void, vx: c_float, vy: c_float, omega: c_float, duration: c_float) -> c_int;
        pub fn set_task_id(handle: *mut c_void, task_id: c_int) -> c_int;
        pub fn set_speed_mode(handle: *mut c_void, speed_mode: c_int) -> c_int;

        pub fn damp(handle: *mut c_void) -> c_int;
        pub fn start_robot(handle: *mut c_void) -> c_int;
        pub fn stand_up(handle: *mut c_void) -> c_int;
        pub fn squat(handle: *mut c_void) -> c_int;
        pub fn sit(handle: *mut c_void) -> c_int;
        pub fn zero_torque(handle: *mut c_void) -> c_int;
        pub fn stop_move(handle: *mut c_void) -> c_int;
        pub fn high_stand(handle: *mut c_void) -> c_int;
        pub fn low_stand(handle: *mut c_void) -> c_int;
        pub fn balance_stand(handle: *mut c_void) -> c_int;
        pub fn continuous_gait(handle: *mut c_void, flag: c_int) -> c_int;
        pub fn switch_move_mode(handle: *mut c_void, flag: c_int) -> c_int;
        pub fn move_robot(handle: *mut c_void, vx: c_float, vy: c_float, vyaw: c_float) -> c_int;
        pub fn wave_hand(handle: *mut c_void, turn_flag: c_int) -> c_int;
        pub fn shake_hand(handle: *mut c_void, stage: c_int) -> c_int;
    }

    #[link(name = "g1_arm_wrapper")]
    unsafe extern "C" {
        pub fn create_arm_client(network_interface: *const c_char) -> *mut c_void;
        pub fn destroy_arm_client(handle: *mut c_void);
        pub fn init_arm_client(handle: *mut c_void) -> c_int;
        pub fn set_arm_timeout(handle: *mut c_void, timeout: c_float) -> c_int;
        pub fn execute_action(handle: *mut c_void, action_id: c_int) -> c_int;
        pub fn get_action_list(handle: *mut c_void) -> StringResult;
        pub fn free_string_result(result: StringResult);
    }
}

fn ptr(handle: RawHandle) -> *mut c_void {
    handle.addr() as *mut c_void
}

fn c_interface(domain: Domain, interface: &str) -> Option<CString> {
    match CString::new(interface) {
        Ok(name) => Some(name),
        Err(_) => {
            warn!(%domain, interface, "interface name contains NUL");
            None
        }
    }
}

fn int_reply(result: sys::IntResult) -> NativeReply<i32> {
    NativeReply {
        code: result.code,
        value: result.value,
    }
}

fn float_reply(result: sys::FloatResult) -> NativeReply<f32> {
    NativeReply {
        code: result.code,
        value: result.value,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Locomotion
// ────────────────────────────────────────────────────────────────────────────

/// `libg1_loco_wrapper` function table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoco;

impl NativeSession for NativeLoco {
    fn domain(&self) -> Domain {
        Domain::Locomotion
    }

    fn create(&self, interface: &str) -> Option<RawHandle> {
        let name = c_interface(Domain::Locomotion, interface)?;
        // SAFETY: `name` is a valid NUL-terminated string for the duration of the call.
        let raw = unsafe { sys::create_loco_client(name.as_ptr()) };
        RawHandle::from_addr(raw as usize)
    }

    fn destroy(&self, handle: RawHandle) {
        // SAFETY: `handle` came from `create_loco_client` and is destroyed once.
        unsafe { sys::destroy_loco_client(ptr(handle)) }
    }

    fn init(&self, handle: RawHandle) -> i32 {
        unsafe { sys::init_loco_client(ptr(handle)) }
    }

    fn set_timeout(&self, handle: RawHandle, seconds: f32) -> i32 {
        unsafe { sys::set_timeout(ptr(handle), seconds) }
    }
}

// SAFETY (all calls below): `handle` is a live handle owned by a
// `Connection`, which serialises every call against it.
impl LocoNative for NativeLoco {
    fn get_fsm_id(&self, handle: RawHandle) -> NativeReply<i32> {
        int_reply(unsafe { sys::get_fsm_id(ptr(handle)) })
    }

    fn get_fsm_mode(&self, handle: RawHandle) -> NativeReply<i32> {
        int_reply(unsafe { sys::get_fsm_mode(ptr(handle)) })
    }

    fn get_balance_mode(&self, handle: RawHandle) -> NativeReply<i32> {
        int_reply(unsafe { sys::get_balance_mode(ptr(handle)) })
    }

    fn get_swing_height(&self, handle: RawHandle) -> NativeReply<f32> {
        float_reply(unsafe { sys::get_swing_height(ptr(handle)) })
    }

    fn get_stand_height(&self, handle: RawHandle) -> NativeReply<f32> {
        float_reply(unsafe { sys::get_stand_height(ptr(handle)) })
    }

    fn set_fsm_id(&self, handle: RawHandle, fsm_id: i32) -> i32 {
        unsafe { sys::set_fsm_id(ptr(handle), fsm_id) }
    }

    fn set_balance_mode(&self, handle: RawHandle, balance_mode: i32) -> i32 {
        unsafe { sys::set_balance_mode(ptr(handle), balance_mode) }
    }

    fn set_swing_height(&self, handle: RawHandle, swing_height: f32) -> i32 {
        unsafe { sys::set_swing_height(ptr(handle), swing_height) }
    }

    fn set_stand_height(&self, handle: RawHandle, stand_height: f32) -> i32 {
        unsafe { sys::set_stand_height(ptr(handle), stand_height) }
    }

    fn set_velocity(&self, handle: RawHandle, vx: f32, vy: f32, omega: f32, duration: f32) -> i32 {
        unsafe { sys::set_velocity(ptr(handle), vx, vy, omega, duration) }
    }

    fn set_task_id(&self, handle: RawHandle, task_id: i32) -> i32 {
        unsafe { sys::set_task_id(ptr(handle), task_id) }
    }

    fn set_speed_mode(&self, handle: RawHandle, speed_mode: i32) -> i32 {
        unsafe { sys::set_speed_mode(ptr(handle), speed_mode) }
    }

    fn damp(&self, handle: RawHandle) -> i32 {
        unsafe { sys::damp(ptr(handle)) }
    }

    fn start(&self, handle: RawHandle) -> i32 {
        unsafe { sys::start_robot(ptr(handle)) }
    }

    fn stand_up(&self, handle: RawHandle) -> i32 {
        unsafe { sys::stand_up(ptr(handle)) }
    }

    fn squat(&self, handle: RawHandle) -> i32 {
        unsafe { sys::squat(ptr(handle)) }
    }

    fn sit(&self, handle: RawHandle) -> i32 {
        unsafe { sys::sit(ptr(handle)) }
    }

    fn zero_torque(&self, handle: RawHandle) -> i32 {
        unsafe { sys::zero_torque(ptr(handle)) }
    }

    fn stop_move(&self, handle: RawHandle) -> i32 {
        unsafe { sys::stop_move(ptr(handle)) }
    }

    fn high_stand(&self, handle: RawHandle) -> i32 {
        unsafe { sys::high_stand(ptr(handle)) }
    }

    fn low_stand(&self, handle: RawHandle) -> i32 {
        unsafe { sys::low_stand(ptr(handle)) }
    }

    fn balance_stand(&self, handle: RawHandle) -> i32 {
        unsafe { sys::balance_stand(ptr(handle)) }
    }

    fn continuous_gait(&self, handle: RawHandle, enable: bool) -> i32 {
        unsafe { sys::continuous_gait(ptr(handle), c_int::from(enable)) }
    }

    fn switch_move_mode(&self, handle: RawHandle, continuous: bool) -> i32 {
        unsafe { sys::switch_move_mode(ptr(handle), c_int::from(continuous)) }
    }

    fn move_robot(&self, handle: RawHandle, vx: f32, vy: f32, vyaw: f32) -> i32 {
        unsafe { sys::move_robot(ptr(handle), vx, vy, vyaw) }
    }

    fn wave_hand(&self, handle: RawHandle, turn: bool) -> i32 {
        unsafe { sys::wave_hand(ptr(handle), c_int::from(turn)) }
    }

    fn shake_hand(&self, handle: RawHandle, stage: i32) -> i32 {
        unsafe { sys::shake_hand(ptr(handle), stage) }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Arm
// ────────────────────────────────────────────────────────────────────────────

/// `libg1_arm_wrapper` function table.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeArm;

impl NativeSession for NativeArm {
    fn domain(&self) -> Domain {
        Domain::Arm
    }

    fn create(&self, interface: &str) -> Option<RawHandle> {
        let name = c_interface(Domain::Arm, interface)?;
        let raw = unsafe { sys::create_arm_client(name.as_ptr()) };
        RawHandle::from_addr(raw as usize)
    }

    fn destroy(&self, handle: RawHandle) {
        unsafe { sys::destroy_arm_client(ptr(handle)) }
    }

    fn init(&self, handle: RawHandle) -> i32 {
        unsafe { sys::init_arm_client(ptr(handle)) }
    }

    fn set_timeout(&self, handle: RawHandle, seconds: f32) -> i32 {
        unsafe { sys::set_arm_timeout(ptr(handle), seconds) }
    }
}

impl ArmNative for NativeArm {
    fn execute_action(&self, handle: RawHandle, action_id: i32) -> i32 {
        unsafe { sys::execute_action(ptr(handle), action_id) }
    }

    fn get_action_list(&self, handle: RawHandle) -> NativeReply<Option<String>> {
        let result = unsafe { sys::get_action_list(ptr(handle)) };
        let code = result.code;
        let value = if result.data.is_null() {
            None
        } else {
            // SAFETY: non-null `data` is a NUL-terminated string owned by the
            // wrapper until `free_string_result`.
            let text: *const c_char = result.data;
            Some(unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned())
        };
        // SAFETY: releases the buffer exactly once; a null `data` is a no-op.
        unsafe { sys::free_string_result(result) };
        NativeReply { code, value }
    }
}
