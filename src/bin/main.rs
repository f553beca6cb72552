#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

use embassy_executor::Spawner;
use embassy_time::{Delay, Instant, Timer};
use esp_hal::{
    clock::CpuClock,
    gpio::{Level, Output, OutputConfig},
    timer::timg::TimerGroup,
};
use firerelay_core::{
    auth::AuthSession,
    config::load_config,
    node::{LOOP_INTERVAL_MS, NodeConfig, RelayNode, TickResult},
    relay::RelayController,
    rtdb::RestApp,
    wifi::{AssociationPolicy, associate},
};
use firerelay_hal_esp32s3::{
    network::{SOCKET_TIMEOUT_MS, TlsTransport},
    relay::{GpioRelay, RelayPolarity},
    storage::flash_config::FlashConfigStore,
};
use log::{LevelFilter, error, info};
use mbedtls_rs::Tls;
use static_cell::StaticCell;

use station::RadioStation;

#[path = "main/station.rs"]
mod station;

const NET_SEED: u64 = 0x5A17_2B34_D099_EE11;

static NET_RESOURCES: StaticCell<embassy_net::StackResources<4>> = StaticCell::new();

#[panic_handler]
fn panic(_: &core::panic::PanicInfo) -> ! {
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

/// Parks the firmware after an unrecoverable setup failure.
async fn halt() -> ! {
    loop {
        Timer::after_secs(1).await;
    }
}

#[allow(
    clippy::large_stack_frames,
    reason = "it's not unusual to allocate larger buffers etc. in main"
)]
#[esp_rtos::main]
async fn main(_spawner: Spawner) -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_println::println!("boot: firerelay starting");

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // esp-radio and the TLS sessions require an allocator.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 65536);
    esp_alloc::heap_allocator!(size: 48 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    // Relay coil on GPIO4, active high, de-energised from the first instruction.
    let relay_pin = Output::new(peripherals.GPIO4, Level::Low, OutputConfig::default());
    let relay = match RelayController::new(GpioRelay::new(relay_pin, RelayPolarity::ActiveHigh)) {
        Ok(relay) => relay,
        Err(err) => {
            error!("relay init failed: {:?}", err);
            halt().await
        }
    };
    info!("relay on GPIO4 initialised OFF");

    let device_config = match FlashConfigStore::new() {
        Ok(mut store) => match load_config(&mut store) {
            Ok(device_config) => device_config,
            Err(err) => {
                error!("config load failed: {:?}", err);
                halt().await
            }
        },
        Err(err) => {
            error!("config storage unavailable: {:?}", err);
            halt().await
        }
    };
    info!("config loaded for ssid {}", device_config.ssid);

    let radio = match esp_radio::init() {
        Ok(radio) => radio,
        Err(err) => {
            error!("esp-radio init failed: {:?}", err);
            halt().await
        }
    };

    let (wifi_controller, interfaces) =
        match esp_radio::wifi::new(&radio, peripherals.WIFI, esp_radio::wifi::Config::default()) {
            Ok(parts) => parts,
            Err(err) => {
                error!("wifi peripheral init failed: {:?}", err);
                halt().await
            }
        };

    let stack_config = embassy_net::Config::dhcpv4(Default::default());
    let (stack, mut net_runner) = embassy_net::new(
        interfaces.sta,
        stack_config,
        NET_RESOURCES.init(embassy_net::StackResources::<4>::new()),
        NET_SEED,
    );

    let tls = match Tls::new(peripherals.SHA) {
        Ok(tls) => tls,
        Err(err) => {
            error!("tls init failed: {:?}", err);
            halt().await
        }
    };

    let net_future = net_runner.run();
    let firmware_future = async {
        let mut station = RadioStation::new(wifi_controller, stack);
        let mut delay = Delay;
        if let Err(stall) = associate(
            &mut station,
            &mut delay,
            &device_config.ssid,
            &device_config.wifi_password,
            AssociationPolicy::default(),
        )
        .await
        {
            error!(
                "wifi gave up after {} attempts ({} polls)",
                stall.attempts, stall.polls
            );
            halt().await;
        }
        esp_println::println!("");
        if let Some(v4) = stack.config_v4() {
            info!("wifi connected, ip {}", v4.address.address());
        }

        let mut auth_transport = TlsTransport::new(stack, tls.reference());
        auth_transport.set_insecure();
        auth_transport.set_timeout_ms(SOCKET_TIMEOUT_MS);
        let mut db_transport = TlsTransport::new(stack, tls.reference());
        db_transport.set_insecure();
        db_transport.set_timeout_ms(SOCKET_TIMEOUT_MS);

        let mut node = RelayNode::new(
            RestApp::new(auth_transport, db_transport),
            relay,
            NodeConfig {
                follow_changes: true,
            },
        );
        if let Err(err) = AuthSession::begin(node.app_mut(), &device_config) {
            error!("auth setup failed: {:?}", err);
            halt().await;
        }

        loop {
            let now_ms = Instant::now().as_millis();
            if node.tick(now_ms).await == TickResult::BecameReady {
                info!("initial relay read requested");
            }
            Timer::after_millis(LOOP_INTERVAL_MS).await;
            if node.drain_results() > 0 {
                info!("relay is {}", if node.relay_state() { "ON" } else { "OFF" });
            }
        }
    };

    let _ = embassy_futures::join::join(net_future, firmware_future).await;
    unreachable!()
}
