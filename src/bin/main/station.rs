use embassy_net::Stack;
use esp_radio::wifi::{ClientConfig, ModeConfig, WifiController, WifiError};
use firerelay_core::wifi::WifiStation;
use log::info;

/// Wi-Fi station backed by the radio controller and the embassy-net stack.
pub struct RadioStation<'d> {
    controller: WifiController<'d>,
    stack: Stack<'d>,
}

impl<'d> RadioStation<'d> {
    pub fn new(controller: WifiController<'d>, stack: Stack<'d>) -> Self {
        Self { controller, stack }
    }
}

impl WifiStation for RadioStation<'_> {
    type Error = WifiError;

    async fn begin(&mut self, ssid: &str, password: &str) -> Result<(), Self::Error> {
        let client_config = ClientConfig::default()
            .with_ssid(ssid.into())
            .with_password(password.into());
        self.controller
            .set_config(&ModeConfig::Client(client_config))?;

        if !self.controller.is_started().unwrap_or(false) {
            self.controller.start_async().await?;
        }
        self.controller.connect_async().await
    }

    fn is_connected(&mut self) -> bool {
        matches!(self.controller.is_connected(), Ok(true))
            && self.stack.is_link_up()
            && self.stack.config_v4().is_some()
    }

    async fn reset(&mut self) {
        if let Err(err) = self.controller.disconnect_async().await {
            info!("wifi disconnect failed: {:?}", err);
        }
    }

    fn on_progress(&mut self) {
        esp_println::print!(".");
    }
}
