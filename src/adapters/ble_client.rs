//! BLE GATT client adapter for the lock.
//!
//! Implements [`LockTransport`]: scan for the lock's address, connect,
//! discover the UART-style service, subscribe to the notify
//! characteristic and write frames to the write characteristic.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: Bluedroid GATT client via raw `esp_idf_svc::sys` calls.
//! - **all other targets**: simulation stub that never reaches `Ready`.
//!
//! ## Link setup sequence (espidf)
//!
//! ```text
//!  open() ─▶ stack init ─▶ GATTC REG ─▶ scan params ─▶ scan (30 s)
//!     ─▶ address match ─▶ gattc_open ─▶ MTU ─▶ service search
//!     ─▶ write + notify chars ─▶ register notify ─▶ CCCD write ─▶ Ready
//! ```
//!
//! Notifications are pushed into the [`Inbox`] from the Bluedroid task.

use std::sync::Arc;

use log::info;

use crate::app::inbox::Inbox;
use crate::app::ports::{LinkState, LockTransport};
use crate::config::MacAddress;
use crate::error::TransportError;

/// Seconds a single scan runs before the attempt counts as failed.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const SCAN_DURATION_SECS: u32 = 30;

/// Local MTU requested from the stack.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const LOCAL_MTU: u16 = 500;

/// Longest wait for the lock's write response.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const WRITE_ACK_TIMEOUT_MS: u32 = 2000;

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
const WRITE_ACK_POLL_MS: u32 = 5;

/// Wait for the write-with-response outcome.
///
/// `take_ack` yields the GATT result once the stack reports it (`true` for
/// success).  Anything short of an acknowledged write within
/// [`WRITE_ACK_TIMEOUT_MS`] is `WriteFailed`.
#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn await_write_ack(
    mut take_ack: impl FnMut() -> Option<bool>,
    link_up: impl Fn() -> bool,
    sleep_ms: impl Fn(u32),
) -> Result<(), TransportError> {
    let mut waited = 0;
    loop {
        match take_ack() {
            Some(true) => return Ok(()),
            Some(false) => return Err(TransportError::WriteFailed),
            None => {}
        }
        if !link_up() {
            log::warn!("BLE: link dropped awaiting write response");
            return Err(TransportError::WriteFailed);
        }
        if waited >= WRITE_ACK_TIMEOUT_MS {
            log::warn!("BLE: no write response after {} ms", waited);
            return Err(TransportError::WriteFailed);
        }
        sleep_ms(WRITE_ACK_POLL_MS);
        waited += WRITE_ACK_POLL_MS;
    }
}

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn link_to_u8(state: LinkState) -> u8 {
    match state {
        LinkState::Down => 0,
        LinkState::Connecting => 1,
        LinkState::Ready => 2,
        LinkState::Failed => 3,
    }
}

#[cfg_attr(not(target_os = "espidf"), allow(dead_code))]
fn link_from_u8(v: u8) -> LinkState {
    match v {
        1 => LinkState::Connecting,
        2 => LinkState::Ready,
        3 => LinkState::Failed,
        _ => LinkState::Down,
    }
}

// ───────────────────────────────────────────────────────────────
// ESP-IDF static state
// ───────────────────────────────────────────────────────────────
//
// Bluedroid callbacks are C function pointers that cannot capture Rust
// closures. These statics bridge the callback context to the adapter.

#[cfg(target_os = "espidf")]
mod bluedroid {
    use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};
    use std::sync::{Arc, Mutex};

    use esp_idf_svc::sys::*;
    use log::{debug, error, info, warn};

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::signal::Signal;

    use super::{LOCAL_MTU, SCAN_DURATION_SECS, await_write_ack, link_from_u8, link_to_u8};
    use crate::app::inbox::{Inbox, push_notification};
    use crate::app::ports::LinkState;
    use crate::error::TransportError;
    use crate::protocol::{CCCD_UUID, NOTIFY_CHAR_UUID, SERVICE_UUID, WRITE_CHAR_UUID};

    const GATT_IF_NONE: u8 = 0xff;

    static LINK: AtomicU8 = AtomicU8::new(0);
    static STACK_UP: AtomicBool = AtomicBool::new(false);
    static CLASSIC_MEM_RELEASED: AtomicBool = AtomicBool::new(false);
    static GATTC_IF: AtomicU8 = AtomicU8::new(GATT_IF_NONE);
    static CONN_ID: AtomicU16 = AtomicU16::new(0);
    static CONNECTED: AtomicBool = AtomicBool::new(false);
    static SERVICE_FOUND: AtomicBool = AtomicBool::new(false);
    static SERVICE_START: AtomicU16 = AtomicU16::new(0);
    static SERVICE_END: AtomicU16 = AtomicU16::new(0);
    static WRITE_HANDLE: AtomicU16 = AtomicU16::new(0);
    static NOTIFY_HANDLE: AtomicU16 = AtomicU16::new(0);

    // GATTC callbacks run in the Bluedroid task (not ISR), so std Mutex is safe.
    static TARGET: Mutex<[u8; 6]> = Mutex::new([0; 6]);
    static REMOTE_BDA: Mutex<[u8; 6]> = Mutex::new([0; 6]);
    static INBOX: Mutex<Option<Arc<Inbox>>> = Mutex::new(None);

    /// Outcome of the last characteristic write, set from WRITE_CHAR_EVT.
    static WRITE_DONE: Signal<CriticalSectionRawMutex, bool> = Signal::new();

    pub fn set_link(state: LinkState) {
        LINK.store(link_to_u8(state), Ordering::Release);
    }

    pub fn link() -> LinkState {
        link_from_u8(LINK.load(Ordering::Acquire))
    }

    pub fn set_inbox(inbox: Arc<Inbox>) {
        if let Ok(mut slot) = INBOX.lock() {
            *slot = Some(inbox);
        }
    }

    pub fn set_target(mac: [u8; 6]) {
        if let Ok(mut t) = TARGET.lock() {
            *t = mac;
        }
    }

    fn uuid128(uuid: u128) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_128 as u16;
        t.uuid.uuid128 = uuid.to_le_bytes();
        t
    }

    fn uuid16(uuid: u16) -> esp_bt_uuid_t {
        let mut t: esp_bt_uuid_t = unsafe { core::mem::zeroed() };
        t.len = ESP_UUID_LEN_16 as u16;
        t.uuid.uuid16 = uuid;
        t
    }

    fn check(ret: esp_err_t, what: &str) -> Result<(), TransportError> {
        if ret == ESP_OK as i32 {
            Ok(())
        } else {
            error!("BLE: {} failed ({})", what, ret);
            Err(TransportError::StackInitFailed)
        }
    }

    fn set_scan_params() -> Result<(), TransportError> {
        let mut params = esp_ble_scan_params_t {
            scan_type: esp_ble_scan_type_t_BLE_SCAN_TYPE_ACTIVE,
            own_addr_type: esp_ble_addr_type_t_BLE_ADDR_TYPE_PUBLIC,
            scan_filter_policy: esp_ble_scan_filter_t_BLE_SCAN_FILTER_ALLOW_ALL,
            scan_interval: 0x50,
            scan_window: 0x30,
            scan_duplicate: esp_ble_scan_duplicate_t_BLE_SCAN_DUPLICATE_DISABLE,
        };
        check(unsafe { esp_ble_gap_set_scan_params(&mut params) }, "set_scan_params")
    }

    /// Bring the stack up (first open) or restart scanning (later opens).
    pub fn start() -> Result<(), TransportError> {
        if STACK_UP.load(Ordering::Acquire) {
            if GATTC_IF.load(Ordering::Acquire) != GATT_IF_NONE {
                return set_scan_params();
            }
            // Registration still in flight; REG_EVT starts the scan.
            return Ok(());
        }

        unsafe {
            // Classic BT memory can only be released once per boot.
            if !CLASSIC_MEM_RELEASED.swap(true, Ordering::AcqRel) {
                check(
                    esp_bt_controller_mem_release(esp_bt_mode_t_ESP_BT_MODE_CLASSIC_BT),
                    "bt_controller_mem_release",
                )?;
            }

            let mut bt_cfg = esp_bt_controller_config_t::default();
            check(esp_bt_controller_init(&mut bt_cfg), "bt_controller_init")?;
            check(
                esp_bt_controller_enable(esp_bt_mode_t_ESP_BT_MODE_BLE),
                "bt_controller_enable",
            )?;
            check(esp_bluedroid_init(), "bluedroid_init")?;
            check(esp_bluedroid_enable(), "bluedroid_enable")?;

            check(
                esp_ble_gap_register_callback(Some(gap_event_handler)),
                "gap_register_callback",
            )?;
            check(
                esp_ble_gattc_register_callback(Some(gattc_event_handler)),
                "gattc_register_callback",
            )?;
            check(esp_ble_gattc_app_register(0), "gattc_app_register")?;
            if esp_ble_gatt_set_local_mtu(LOCAL_MTU) != ESP_OK as i32 {
                warn!("BLE: set local MTU {} rejected", LOCAL_MTU);
            }
        }

        STACK_UP.store(true, Ordering::Release);
        info!("BLE(espidf): Bluedroid GATT client initialized");
        Ok(())
    }

    /// Close the connection and release the stack.
    pub fn stop() {
        let gattc_if = GATTC_IF.swap(GATT_IF_NONE, Ordering::AcqRel);
        unsafe {
            if CONNECTED.swap(false, Ordering::AcqRel) && gattc_if != GATT_IF_NONE {
                esp_ble_gattc_close(gattc_if, CONN_ID.load(Ordering::Acquire));
            }
            if STACK_UP.swap(false, Ordering::AcqRel) {
                esp_bluedroid_disable();
                esp_bluedroid_deinit();
                esp_bt_controller_disable();
                esp_bt_controller_deinit();
            }
        }
        WRITE_HANDLE.store(0, Ordering::Release);
        NOTIFY_HANDLE.store(0, Ordering::Release);
        SERVICE_FOUND.store(false, Ordering::Release);
        set_link(LinkState::Down);
        info!("BLE(espidf): stack shut down");
    }

    pub fn write(frame: &[u8]) -> Result<(), TransportError> {
        let handle = WRITE_HANDLE.load(Ordering::Acquire);
        let gattc_if = GATTC_IF.load(Ordering::Acquire);
        if link() != LinkState::Ready || handle == 0 || gattc_if == GATT_IF_NONE {
            return Err(TransportError::NotConnected);
        }
        let mut buf: heapless::Vec<u8, { crate::protocol::FRAME_CAPACITY }> =
            heapless::Vec::from_slice(frame).map_err(|_| TransportError::WriteFailed)?;
        WRITE_DONE.reset();
        let ret = unsafe {
            esp_ble_gattc_write_char(
                gattc_if,
                CONN_ID.load(Ordering::Acquire),
                handle,
                buf.len() as u16,
                buf.as_mut_ptr(),
                esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_RSP,
                esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
            )
        };
        if ret != ESP_OK as i32 {
            warn!("BLE: write_char failed ({})", ret);
            return Err(TransportError::WriteFailed);
        }
        // One frame in flight: block until the lock answers the write.
        await_write_ack(
            || WRITE_DONE.try_take(),
            || link() == LinkState::Ready,
            esp_idf_hal::delay::FreeRtos::delay_ms,
        )
    }

    unsafe extern "C" fn gap_event_handler(
        event: esp_gap_ble_cb_event_t,
        param: *mut esp_ble_gap_cb_param_t,
    ) {
        match event {
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_PARAM_SET_COMPLETE_EVT => {
                unsafe { esp_ble_gap_start_scanning(SCAN_DURATION_SECS) };
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_START_COMPLETE_EVT => {
                let status = unsafe { (*param).scan_start_cmpl.status };
                if status == esp_bt_status_t_ESP_BT_STATUS_SUCCESS {
                    info!("BLE GAP: scanning");
                } else {
                    warn!("BLE GAP: scan start failed ({})", status);
                    set_link(LinkState::Failed);
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_RESULT_EVT => {
                let scan = unsafe { &mut (*param).scan_rst };
                match scan.search_evt {
                    esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_RES_EVT => {
                        let target = TARGET.lock().map(|t| *t).unwrap_or([0; 6]);
                        if scan.bda != target || CONNECTED.load(Ordering::Acquire) {
                            return;
                        }
                        info!("BLE GAP: lock found, connecting");
                        if let Ok(mut bda) = REMOTE_BDA.lock() {
                            *bda = scan.bda;
                        }
                        unsafe {
                            esp_ble_gap_stop_scanning();
                            esp_ble_gattc_open(
                                GATTC_IF.load(Ordering::Acquire),
                                scan.bda.as_mut_ptr(),
                                scan.ble_addr_type,
                                true,
                            );
                        }
                    }
                    esp_gap_search_evt_t_ESP_GAP_SEARCH_INQ_CMPL_EVT => {
                        if link() == LinkState::Connecting && !CONNECTED.load(Ordering::Acquire) {
                            warn!("BLE GAP: scan finished without finding the lock");
                            set_link(LinkState::Failed);
                        }
                    }
                    _ => {}
                }
            }
            esp_gap_ble_cb_event_t_ESP_GAP_BLE_SCAN_STOP_COMPLETE_EVT => {
                debug!("BLE GAP: scan stopped");
            }
            _ => {}
        }
    }

    unsafe extern "C" fn gattc_event_handler(
        event: esp_gattc_cb_event_t,
        gattc_if: esp_gatt_if_t,
        param: *mut esp_ble_gattc_cb_param_t,
    ) {
        let p = unsafe { &mut *param };
        match event {
            esp_gattc_cb_event_t_ESP_GATTC_REG_EVT => {
                info!("BLE GATTC: app registered (if={})", gattc_if);
                GATTC_IF.store(gattc_if, Ordering::Release);
                if set_scan_params().is_err() {
                    set_link(LinkState::Failed);
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_CONNECT_EVT => {
                let conn = unsafe { &p.connect };
                CONN_ID.store(conn.conn_id, Ordering::Release);
                CONNECTED.store(true, Ordering::Release);
                info!("BLE GATTC: connected (conn_id={})", conn.conn_id);
                unsafe { esp_ble_gattc_send_mtu_req(gattc_if, conn.conn_id) };
            }
            esp_gattc_cb_event_t_ESP_GATTC_OPEN_EVT => {
                let open = unsafe { &p.open };
                if open.status != esp_gatt_status_t_ESP_GATT_OK {
                    warn!("BLE GATTC: open failed ({})", open.status);
                    set_link(LinkState::Failed);
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_CFG_MTU_EVT => {
                let mtu = unsafe { &p.cfg_mtu };
                debug!("BLE GATTC: MTU {} (status {})", mtu.mtu, mtu.status);
            }
            esp_gattc_cb_event_t_ESP_GATTC_DIS_SRVC_CMPL_EVT => {
                let dis = unsafe { &p.dis_srvc_cmpl };
                if dis.status != esp_gatt_status_t_ESP_GATT_OK {
                    warn!("BLE GATTC: service discovery failed ({})", dis.status);
                    set_link(LinkState::Failed);
                    return;
                }
                let mut filter = uuid128(SERVICE_UUID);
                unsafe { esp_ble_gattc_search_service(gattc_if, dis.conn_id, &mut filter) };
            }
            esp_gattc_cb_event_t_ESP_GATTC_SEARCH_RES_EVT => {
                let res = unsafe { &p.search_res };
                let uuid = &res.srvc_id.uuid;
                if uuid.len == ESP_UUID_LEN_128 as u16
                    && unsafe { uuid.uuid.uuid128 } == SERVICE_UUID.to_le_bytes()
                {
                    SERVICE_START.store(res.start_handle, Ordering::Release);
                    SERVICE_END.store(res.end_handle, Ordering::Release);
                    SERVICE_FOUND.store(true, Ordering::Release);
                    debug!(
                        "BLE GATTC: service handles {}..{}",
                        res.start_handle, res.end_handle
                    );
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_SEARCH_CMPL_EVT => {
                let cmpl = unsafe { &p.search_cmpl };
                if cmpl.status != esp_gatt_status_t_ESP_GATT_OK
                    || !SERVICE_FOUND.load(Ordering::Acquire)
                {
                    warn!("BLE GATTC: lock service not found");
                    set_link(LinkState::Failed);
                    return;
                }
                resolve_characteristics(gattc_if, cmpl.conn_id);
            }
            esp_gattc_cb_event_t_ESP_GATTC_REG_FOR_NOTIFY_EVT => {
                let reg = unsafe { &p.reg_for_notify };
                if reg.status != esp_gatt_status_t_ESP_GATT_OK {
                    warn!("BLE GATTC: notify registration failed ({})", reg.status);
                    set_link(LinkState::Failed);
                    return;
                }
                enable_notifications(gattc_if, reg.handle);
            }
            esp_gattc_cb_event_t_ESP_GATTC_WRITE_DESCR_EVT => {
                let w = unsafe { &p.write };
                if w.status == esp_gatt_status_t_ESP_GATT_OK {
                    info!("BLE GATTC: notifications enabled, link ready");
                    set_link(LinkState::Ready);
                } else {
                    warn!("BLE GATTC: CCCD write failed ({})", w.status);
                    set_link(LinkState::Failed);
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_WRITE_CHAR_EVT => {
                let w = unsafe { &p.write };
                let ok = w.status == esp_gatt_status_t_ESP_GATT_OK;
                if !ok {
                    warn!("BLE GATTC: write not acknowledged ({})", w.status);
                }
                WRITE_DONE.signal(ok);
            }
            esp_gattc_cb_event_t_ESP_GATTC_NOTIFY_EVT => {
                let n = unsafe { &p.notify };
                if n.value.is_null() {
                    return;
                }
                let data = unsafe { core::slice::from_raw_parts(n.value, n.value_len as usize) };
                if let Ok(slot) = INBOX.lock() {
                    if let Some(inbox) = slot.as_ref() {
                        push_notification(inbox, data);
                    }
                }
            }
            esp_gattc_cb_event_t_ESP_GATTC_DISCONNECT_EVT => {
                let d = unsafe { &p.disconnect };
                CONNECTED.store(false, Ordering::Release);
                WRITE_HANDLE.store(0, Ordering::Release);
                NOTIFY_HANDLE.store(0, Ordering::Release);
                SERVICE_FOUND.store(false, Ordering::Release);
                warn!("BLE GATTC: disconnected (reason=0x{:x})", d.reason);
                set_link(LinkState::Down);
            }
            _ => {}
        }
    }

    fn resolve_characteristics(gattc_if: esp_gatt_if_t, conn_id: u16) {
        let start = SERVICE_START.load(Ordering::Acquire);
        let end = SERVICE_END.load(Ordering::Acquire);

        let mut elem: esp_gattc_char_elem_t = unsafe { core::mem::zeroed() };
        let mut count: u16 = 1;
        let status = unsafe {
            esp_ble_gattc_get_char_by_uuid(
                gattc_if,
                conn_id,
                start,
                end,
                uuid128(WRITE_CHAR_UUID),
                &mut elem,
                &mut count,
            )
        };
        if status != esp_gatt_status_t_ESP_GATT_OK
            || count == 0
            || elem.properties as u32 & ESP_GATT_CHAR_PROP_BIT_WRITE == 0
        {
            warn!("BLE GATTC: write characteristic missing");
            set_link(LinkState::Failed);
            return;
        }
        WRITE_HANDLE.store(elem.char_handle, Ordering::Release);

        let mut elem: esp_gattc_char_elem_t = unsafe { core::mem::zeroed() };
        let mut count: u16 = 1;
        let status = unsafe {
            esp_ble_gattc_get_char_by_uuid(
                gattc_if,
                conn_id,
                start,
                end,
                uuid128(NOTIFY_CHAR_UUID),
                &mut elem,
                &mut count,
            )
        };
        if status != esp_gatt_status_t_ESP_GATT_OK
            || count == 0
            || elem.properties as u32 & ESP_GATT_CHAR_PROP_BIT_NOTIFY == 0
        {
            warn!("BLE GATTC: notify characteristic missing");
            set_link(LinkState::Failed);
            return;
        }
        NOTIFY_HANDLE.store(elem.char_handle, Ordering::Release);

        let mut bda = REMOTE_BDA.lock().map(|b| *b).unwrap_or([0; 6]);
        unsafe { esp_ble_gattc_register_for_notify(gattc_if, bda.as_mut_ptr(), elem.char_handle) };
    }

    fn enable_notifications(gattc_if: esp_gatt_if_t, char_handle: u16) {
        let conn_id = CONN_ID.load(Ordering::Acquire);
        let mut descr: esp_gattc_descr_elem_t = unsafe { core::mem::zeroed() };
        let mut count: u16 = 1;
        let status = unsafe {
            esp_ble_gattc_get_descr_by_char_handle(
                gattc_if,
                conn_id,
                char_handle,
                uuid16(CCCD_UUID),
                &mut descr,
                &mut count,
            )
        };
        if status != esp_gatt_status_t_ESP_GATT_OK || count == 0 {
            warn!("BLE GATTC: CCCD not found");
            set_link(LinkState::Failed);
            return;
        }
        let mut notify_en: [u8; 2] = 1u16.to_le_bytes();
        unsafe {
            esp_ble_gattc_write_char_descr(
                gattc_if,
                conn_id,
                descr.handle,
                notify_en.len() as u16,
                notify_en.as_mut_ptr(),
                esp_gatt_write_type_t_ESP_GATT_WRITE_TYPE_RSP,
                esp_gatt_auth_req_t_ESP_GATT_AUTH_REQ_NONE,
            );
        }
    }
}

// ───────────────────────────────────────────────────────────────
// BLE client adapter
// ───────────────────────────────────────────────────────────────

pub struct BleLockClient {
    #[cfg(not(target_os = "espidf"))]
    sim_link: LinkState,
    #[cfg(not(target_os = "espidf"))]
    sim_inbox: Option<Arc<Inbox>>,
}

impl Default for BleLockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BleLockClient {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            sim_link: LinkState::Down,
            #[cfg(not(target_os = "espidf"))]
            sim_inbox: None,
        }
    }

    /// Deliver a notification as if the lock had sent it.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_notify(&self, bytes: &[u8]) -> bool {
        match &self.sim_inbox {
            Some(inbox) => crate::app::inbox::push_notification(inbox, bytes),
            None => false,
        }
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_on_notify(&mut self, inbox: Arc<Inbox>) {
        bluedroid::set_inbox(inbox);
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_on_notify(&mut self, inbox: Arc<Inbox>) {
        self.sim_inbox = Some(inbox);
    }

    #[cfg(target_os = "espidf")]
    fn platform_open(&mut self, address: &MacAddress) -> Result<(), TransportError> {
        bluedroid::set_target(address.octets());
        bluedroid::set_link(LinkState::Connecting);
        bluedroid::start().inspect_err(|_| bluedroid::set_link(LinkState::Failed))
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_open(&mut self, address: &MacAddress) -> Result<(), TransportError> {
        info!("BLE(sim): scanning for {} (no radio)", address);
        self.sim_link = LinkState::Connecting;
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_link_state(&self) -> LinkState {
        bluedroid::link()
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_link_state(&self) -> LinkState {
        self.sim_link
    }

    #[cfg(target_os = "espidf")]
    fn platform_send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        bluedroid::write(frame)
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        log::warn!("BLE(sim): dropping {}-byte write, not connected", frame.len());
        Err(TransportError::NotConnected)
    }

    #[cfg(target_os = "espidf")]
    fn platform_close(&mut self) {
        bluedroid::stop();
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_close(&mut self) {
        info!("BLE(sim): link closed");
        self.sim_link = LinkState::Down;
    }
}

// ───────────────────────────────────────────────────────────────
// LockTransport implementation
// ───────────────────────────────────────────────────────────────

impl LockTransport for BleLockClient {
    fn on_notify(&mut self, inbox: Arc<Inbox>) {
        self.platform_on_notify(inbox);
    }

    fn open(&mut self, address: &MacAddress) -> Result<(), TransportError> {
        info!("BLE: opening link to {}", address);
        self.platform_open(address)
    }

    fn link_state(&self) -> LinkState {
        self.platform_link_state()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.platform_send(frame)
    }

    fn close(&mut self) {
        self.platform_close();
        info!("BLE: link closed");
    }
}
