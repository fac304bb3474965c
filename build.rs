use serde::Deserialize;

/// Optional build-time defaults for `sara_modem::Config`.
#[derive(Deserialize)]
struct Config {
    apn: Option<String>,
    baudrate: Option<u32>,
    high_baudrate: Option<u32>,
    input_buffer_size: Option<usize>,
    read_timeout_ms: Option<u64>,
}

impl Config {
    fn check(&self) {
        if let Some(apn) = &self.apn {
            assert!(!apn.is_empty(), "apn is empty");
            assert!(apn.len() <= 99, "apn is too long");
        }
        for baudrate in [self.baudrate, self.high_baudrate].into_iter().flatten() {
            assert!(baudrate > 0, "baudrate is invalid");
        }
        if let Some(size) = self.input_buffer_size {
            assert!(size >= 64, "input_buffer_size should be at least 64");
        }
        if let Some(timeout) = self.read_timeout_ms {
            assert!(timeout > 0, "read_timeout_ms is invalid");
        }
    }

    fn export_vars(&self) {
        if let Some(apn) = &self.apn {
            println!("cargo:rustc-env=SARA_APN={}", apn);
        }
        if let Some(baudrate) = self.baudrate {
            println!("cargo:rustc-env=SARA_BAUDRATE={}", baudrate);
        }
        if let Some(baudrate) = self.high_baudrate {
            println!("cargo:rustc-env=SARA_HIGH_BAUDRATE={}", baudrate);
        }
        if let Some(size) = self.input_buffer_size {
            println!("cargo:rustc-env=SARA_INPUT_BUFFER_SIZE={}", size);
        }
        if let Some(timeout) = self.read_timeout_ms {
            println!("cargo:rustc-env=SARA_READ_TIMEOUT_MS={}", timeout);
        }
    }
}

fn main() {
    println!("cargo:rerun-if-changed=modem.yml");
    let Ok(config_string) = std::fs::read_to_string("modem.yml") else {
        return;
    };
    let config = serde_yaml::from_str::<Config>(&config_string).expect("modem.yml is not valid");
    config.check();
    config.export_vars();
}
