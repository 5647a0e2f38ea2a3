//! [`MeshRadio`] on top of the esp-zigbee-lib C API.
//!
//! The stack runs its own main loop on a dedicated thread and reports network
//! events through `esp_zb_app_signal_handler`, which the library links against
//! by name. `start` blocks until that handler reports the first-start or
//! reboot result.

use std::{
    ffi::c_void,
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use esp_idf_hal::delay::BLOCK;
use esp_idf_sys::{zb, ESP_FAIL, ESP_OK};
use log::{info, warn};

use outlet_common::{
    zcl, DeviceRole, EndpointIdentity, MeshRadio, NetworkKey, RadioError, StartLatch,
    SystemClock,
};

static CONNECTED: AtomicBool = AtomicBool::new(false);
static STARTED: StartLatch = StartLatch::new();

const CLUSTER_SERVER_ROLE: u8 = 0x01;
const MAX_CHILDREN: u8 = 10;
const END_DEVICE_KEEP_ALIVE_MS: u32 = 3_000;
const COMMISSIONING_RETRY_MS: u32 = 1_000;
const STACK_THREAD_STACK_SIZE: usize = 8 * 1024;
// Below the task watchdog timeout of the calling task.
const START_TIMEOUT_MS: u64 = 15_000;
const START_POLL_MS: u64 = 50;

pub struct ZigbeeRadio {
    channel_mask: u32,
    join_distributed: bool,
    key: Option<NetworkKey>,
    endpoint: Option<EndpointIdentity>,
}

impl ZigbeeRadio {
    pub fn new(channel_mask: u32) -> Self {
        Self {
            channel_mask,
            join_distributed: false,
            key: None,
            endpoint: None,
        }
    }
}

impl MeshRadio for ZigbeeRadio {
    fn set_distributed_network_key(&mut self, key: &NetworkKey) {
        self.key = Some(*key);
    }

    fn enable_joining_to_distributed(&mut self, enabled: bool) {
        self.join_distributed = enabled;
    }

    fn register_endpoint(&mut self, endpoint: &EndpointIdentity) {
        self.endpoint = Some(endpoint.clone());
    }

    fn start(&mut self, role: DeviceRole) -> Result<(), RadioError> {
        configure_platform()?;
        init_stack(role);

        unsafe { zb::esp_zb_enable_joining_to_distributed(self.join_distributed) };
        if let Some(key) = self.key {
            let mut bytes = *key.as_bytes();
            unsafe { zb::esp_zb_secur_TC_standard_distributed_key_set(bytes.as_mut_ptr()) };
        }

        if let Some(identity) = &self.endpoint {
            register_light_endpoint(identity)?;
        }

        let rc = unsafe { zb::esp_zb_set_primary_network_channel_set(self.channel_mask) };
        if rc != ESP_OK {
            warn!("channel mask {:#010x} rejected: {rc}", self.channel_mask);
        }

        STARTED.clear();
        let rc = unsafe { zb::esp_zb_start(false) };
        if rc != ESP_OK {
            return Err(RadioError::Start(rc));
        }

        thread::Builder::new()
            .name("zigbee-main".into())
            .stack_size(STACK_THREAD_STACK_SIZE)
            .spawn(|| unsafe { zb::esp_zb_stack_main_loop() })
            .map_err(|err| {
                warn!("failed to spawn zigbee main loop: {err}");
                RadioError::Start(ESP_FAIL)
            })?;

        STARTED.wait(&mut SystemClock, START_TIMEOUT_MS, START_POLL_MS)?;
        info!("zigbee stack started as {}", role.as_str());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        CONNECTED.load(Ordering::Relaxed)
    }

    fn factory_reset(&mut self) {
        CONNECTED.store(false, Ordering::Relaxed);
        unsafe {
            if zb::esp_zb_lock_acquire(BLOCK) {
                // Announces the leave and erases the network data without
                // rebooting.
                zb::esp_zb_bdb_reset_via_local_action();
                zb::esp_zb_lock_release();
            } else {
                warn!("zigbee lock unavailable, factory reset skipped");
            }
        }
    }
}

fn configure_platform() -> Result<(), RadioError> {
    let mut config = zb::esp_zb_platform_config_t::default();
    config.radio_config.radio_mode = zb::esp_zb_radio_mode_t_ZB_RADIO_MODE_NATIVE;
    config.host_config.host_connection_mode =
        zb::esp_zb_host_connection_mode_t_ZB_HOST_CONNECTION_MODE_NONE;
    let rc = unsafe { zb::esp_zb_platform_config(&mut config) };
    if rc != ESP_OK {
        return Err(RadioError::Platform(rc));
    }
    Ok(())
}

fn init_stack(role: DeviceRole) {
    let mut config = zb::esp_zb_cfg_t::default();
    config.install_code_policy = false;
    match role {
        DeviceRole::Router => {
            config.esp_zb_role = zb::esp_zb_nwk_device_type_t_ESP_ZB_DEVICE_TYPE_ROUTER;
            config.nwk_cfg.zczr_cfg.max_children = MAX_CHILDREN;
        }
        DeviceRole::EndDevice => {
            config.esp_zb_role = zb::esp_zb_nwk_device_type_t_ESP_ZB_DEVICE_TYPE_ED;
            config.nwk_cfg.zed_cfg.ed_timeout =
                zb::esp_zb_aging_timeout_t_ESP_ZB_ED_AGING_TIMEOUT_64MIN as u8;
            config.nwk_cfg.zed_cfg.keep_alive = END_DEVICE_KEEP_ALIVE_MS;
        }
    }
    unsafe { zb::esp_zb_init(&mut config) };
}

fn register_light_endpoint(identity: &EndpointIdentity) -> Result<(), RadioError> {
    let rejected = |reason: &'static str| RadioError::Endpoint {
        endpoint: identity.endpoint,
        reason,
    };

    let clusters = unsafe { zb::esp_zb_zcl_cluster_list_create() };
    if clusters.is_null() {
        return Err(rejected("cluster list allocation failed"));
    }

    for &cluster_id in identity.server_clusters() {
        let rc = unsafe { add_server_cluster(clusters, cluster_id, identity) }
            .ok_or_else(|| rejected("cluster allocation failed"))?;
        if rc != ESP_OK {
            warn!("cluster {cluster_id:#06x} rejected: {rc}");
            return Err(rejected("cluster list rejected"));
        }
    }

    let endpoints = unsafe { zb::esp_zb_ep_list_create() };
    if endpoints.is_null() {
        return Err(rejected("endpoint list allocation failed"));
    }
    let endpoint_config = zb::esp_zb_endpoint_config_t {
        endpoint: identity.endpoint,
        app_profile_id: zcl::HA_PROFILE_ID,
        app_device_id: identity.device_type.device_id(),
        app_device_version: 0,
    };
    if unsafe { zb::esp_zb_ep_list_add_ep(endpoints, clusters, endpoint_config) } != ESP_OK {
        return Err(rejected("endpoint list rejected"));
    }
    if unsafe { zb::esp_zb_device_register(endpoints) } != ESP_OK {
        return Err(rejected("device registration rejected"));
    }
    info!(
        "endpoint {} registered as device {:#06x}",
        identity.endpoint,
        identity.device_type.device_id()
    );
    Ok(())
}

/// Creates one server cluster and appends it to `clusters`. `None` when the
/// library could not allocate it.
unsafe fn add_server_cluster(
    clusters: *mut zb::esp_zb_cluster_list_t,
    cluster_id: u16,
    identity: &EndpointIdentity,
) -> Option<i32> {
    let rc = match cluster_id {
        zcl::cluster::BASIC => {
            let mut config = zb::esp_zb_basic_cluster_cfg_t {
                zcl_version: zcl::basic_attrs::ZCL_VERSION_DEFAULT,
                power_source: zcl::basic_attrs::POWER_SOURCE_MAINS_SINGLE_PHASE,
            };
            let cluster = non_null(zb::esp_zb_basic_cluster_create(&mut config))?;
            for (attr_id, mut value) in identity.basic_string_attributes() {
                let rc = zb::esp_zb_basic_cluster_add_attr(
                    cluster,
                    attr_id,
                    value.as_mut_ptr().cast::<c_void>(),
                );
                if rc != ESP_OK {
                    return Some(rc);
                }
            }
            zb::esp_zb_cluster_list_add_basic_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        zcl::cluster::IDENTIFY => {
            let mut config = zb::esp_zb_identify_cluster_cfg_t::default();
            let cluster = non_null(zb::esp_zb_identify_cluster_create(&mut config))?;
            zb::esp_zb_cluster_list_add_identify_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        zcl::cluster::GROUPS => {
            let mut config = zb::esp_zb_groups_cluster_cfg_t::default();
            let cluster = non_null(zb::esp_zb_groups_cluster_create(&mut config))?;
            zb::esp_zb_cluster_list_add_groups_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        zcl::cluster::SCENES => {
            let mut config = zb::esp_zb_scenes_cluster_cfg_t::default();
            let cluster = non_null(zb::esp_zb_scenes_cluster_create(&mut config))?;
            zb::esp_zb_cluster_list_add_scenes_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        zcl::cluster::ON_OFF => {
            let mut config = zb::esp_zb_on_off_cluster_cfg_t { on_off: false };
            let cluster = non_null(zb::esp_zb_on_off_cluster_create(&mut config))?;
            let mut scene_control = identity.global_scene_control;
            let mut on_time = identity.on_off_on_time;
            for (attr_id, value) in [
                (
                    zcl::on_off_attrs::GLOBAL_SCENE_CONTROL,
                    (&mut scene_control as *mut bool).cast::<c_void>(),
                ),
                (
                    zcl::on_off_attrs::ON_TIME,
                    (&mut on_time as *mut u16).cast::<c_void>(),
                ),
            ] {
                let rc = zb::esp_zb_on_off_cluster_add_attr(cluster, attr_id, value);
                if rc != ESP_OK {
                    return Some(rc);
                }
            }
            zb::esp_zb_cluster_list_add_on_off_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        zcl::cluster::LEVEL_CONTROL => {
            let mut config = zb::esp_zb_level_cluster_cfg_t::default();
            let cluster = non_null(zb::esp_zb_level_cluster_create(&mut config))?;
            zb::esp_zb_cluster_list_add_level_cluster(clusters, cluster, CLUSTER_SERVER_ROLE)
        }
        other => {
            warn!("no server cluster constructor for {other:#06x}");
            ESP_OK
        }
    };
    Some(rc)
}

fn non_null(
    cluster: *mut zb::esp_zb_attribute_list_t,
) -> Option<*mut zb::esp_zb_attribute_list_t> {
    (!cluster.is_null()).then_some(cluster)
}

fn start_commissioning(mode: u8) {
    let rc = unsafe { zb::esp_zb_bdb_start_top_level_commissioning(mode) };
    if rc != ESP_OK {
        warn!("commissioning mode {mode:#04x} failed to start: {rc}");
    }
}

unsafe extern "C" fn retry_commissioning(mode: u8) {
    start_commissioning(mode);
}

fn schedule_commissioning_retry(mode: u8) {
    unsafe {
        zb::esp_zb_scheduler_alarm(Some(retry_commissioning), mode, COMMISSIONING_RETRY_MS);
    }
}

const MODE_INITIALIZATION: u8 =
    zb::esp_zb_bdb_commissioning_mode_t_ESP_ZB_BDB_MODE_INITIALIZATION as u8;
const MODE_NETWORK_STEERING: u8 =
    zb::esp_zb_bdb_commissioning_mode_t_ESP_ZB_BDB_MODE_NETWORK_STEERING as u8;

#[no_mangle]
extern "C" fn esp_zb_app_signal_handler(signal: *mut zb::esp_zb_app_signal_t) {
    let Some(signal) = (unsafe { signal.as_ref() }) else {
        return;
    };
    if signal.p_app_signal.is_null() {
        return;
    }
    let signal_type = unsafe { *signal.p_app_signal };
    let status = signal.esp_err_status;

    match signal_type {
        zb::esp_zb_app_signal_type_t_ESP_ZB_ZDO_SIGNAL_SKIP_STARTUP => {
            info!("zigbee stack initialized");
            start_commissioning(MODE_INITIALIZATION);
        }
        zb::esp_zb_app_signal_type_t_ESP_ZB_BDB_SIGNAL_DEVICE_FIRST_START
        | zb::esp_zb_app_signal_type_t_ESP_ZB_BDB_SIGNAL_DEVICE_REBOOT => {
            STARTED.report(status);
            if status != ESP_OK {
                warn!("zigbee device start failed ({status})");
            } else if unsafe { zb::esp_zb_bdb_is_factory_new() } {
                info!("factory new, starting network steering");
                start_commissioning(MODE_NETWORK_STEERING);
            } else {
                info!("rejoined previous network");
                CONNECTED.store(true, Ordering::Relaxed);
            }
        }
        zb::esp_zb_app_signal_type_t_ESP_ZB_BDB_SIGNAL_STEERING => {
            if status == ESP_OK {
                let pan_id = unsafe { zb::esp_zb_get_pan_id() };
                let channel = unsafe { zb::esp_zb_get_current_channel() };
                info!("joined network pan {pan_id:#06x} on channel {channel}");
                CONNECTED.store(true, Ordering::Relaxed);
            } else {
                info!("network steering unsuccessful ({status}), retrying");
                schedule_commissioning_retry(MODE_NETWORK_STEERING);
            }
        }
        zb::esp_zb_app_signal_type_t_ESP_ZB_ZDO_SIGNAL_LEAVE => {
            warn!("left zigbee network");
            CONNECTED.store(false, Ordering::Relaxed);
        }
        _ => {}
    }
}
