use alloc::string::String;
use core::net::Ipv4Addr;

use anyhow::anyhow;
use embassy_time::Duration;
use serde::de::DeserializeOwned;

use super::response::{Capture, ErrorCode, FirstLine};
use super::Modem;
use crate::at::general::responses::{
    NetworkRegistration, OperatorSelection, PinStatus, SignalQuality, SubscriberNumber,
};
use crate::at::psd::responses::{
    PacketSwitchedNetworkData, PacketSwitchedNetworkState, ResolvedName,
};
use crate::error::{Error, Result};
use crate::gsm::{
    AuthorizationType, Network, NetworkRegistrationStatus, NetworkTechnology, SimStatus,
};
use crate::power::OnOff;
use crate::transport::Transport;

/// PSD profile used for every data connection
const PROFILE: u8 = 0;

/// Idle time between registration checks, spent listening for URCs
const REGISTRATION_POLL: Duration = Duration::from_secs(1);

/// `+CME ERROR` code for a missing SIM
const SIM_NOT_INSERTED: u16 = 10;

impl<T: Transport, P: OnOff> Modem<T, P> {
    fn set_psd_string(&mut self, tag: u8, value: &str) -> Result<()> {
        self.execute(format_args!("AT+UPSD={},{},\"{}\"", PROFILE, tag, value))
    }

    fn psd_param<R: DeserializeOwned>(&mut self, tag: u8, timeout: Duration) -> Result<R> {
        let mut data = Capture::<R>::new("+UPSND");
        self.exchange(
            format_args!("AT+UPSND={},{}", PROFILE, tag),
            &mut [],
            Some(&mut data),
            timeout,
        )?;
        data.take().ok_or(Error::NotFound)
    }

    fn unlock_sim(&mut self, sim_pin: Option<&str>) -> anyhow::Result<()> {
        match self
            .sim_status()
            .map_err(|e| anyhow!("Failed to query SIM status: {e:?}"))?
        {
            SimStatus::Ready => Ok(()),
            SimStatus::NeedsPin => {
                let pin = sim_pin.ok_or_else(|| anyhow!("SIM needs a PIN but none was given"))?;
                self.execute(format_args!("AT+CPIN=\"{}\"", pin))
                    .map_err(|e| anyhow!("Failed to unlock SIM: {e:?}"))
            }
            SimStatus::Missing => Err(anyhow!("No SIM inserted")),
            SimStatus::Unknown => Err(anyhow!("SIM is in an unsupported state")),
        }
    }

    fn wait_for_registration(&mut self) -> anyhow::Result<()> {
        let deadline = self.interface.now() + self.config.join_timeout();
        loop {
            match self.network_status() {
                Ok(status) if status.is_registered() => {
                    log::info!("Registered on network ({:?})", status);
                    return Ok(());
                }
                Ok(NetworkRegistrationStatus::Denied) => {
                    return Err(anyhow!("Network registration denied"))
                }
                Ok(status) => log::debug!("Waiting for network: {:?}", status),
                Err(e) => log::warn!("Failed to query network status: {:?}", e),
            }
            if self.interface.now() >= deadline {
                return Err(anyhow!("Timed out waiting for network registration"));
            }
            self.poll_urcs(REGISTRATION_POLL);
        }
    }
}

fn copy_str<'b>(buf: &'b mut [u8], value: &str) -> Result<&'b str> {
    let dest = buf.get_mut(..value.len()).ok_or(Error::BufferTooSmall)?;
    dest.copy_from_slice(value.as_bytes());
    core::str::from_utf8(dest).map_err(|_| Error::NotFound)
}

fn parse_ip(value: &str) -> Result<Ipv4Addr> {
    value.trim_matches('"').parse().map_err(|_| {
        log::warn!("Not an IPv4 address: {}", value);
        Error::NotFound
    })
}

impl<T: Transport, P: OnOff> Network for Modem<T, P> {
    fn set_apn(&mut self, apn: &str) -> Result<()> {
        self.set_psd_string(1, apn)
    }

    fn set_apn_username(&mut self, username: &str) -> Result<()> {
        self.set_psd_string(2, username)
    }

    fn set_apn_password(&mut self, password: &str) -> Result<()> {
        self.set_psd_string(3, password)
    }

    fn connect(
        &mut self,
        sim_pin: Option<&str>,
        apn: &str,
        username: Option<&str>,
        password: Option<&str>,
        authorization: AuthorizationType,
    ) -> anyhow::Result<()> {
        let apn = match apn {
            "" => self.config.apn.clone(),
            apn => String::from(apn),
        };
        if apn.is_empty() {
            return Err(anyhow!("No APN given or configured"));
        }
        log::info!("Connecting to {}...", apn);
        if !self.on() {
            return Err(anyhow!("Modem did not respond after power on"));
        }
        self.init()
            .map_err(|e| anyhow!("Failed to initialize modem: {e:?}"))?;
        self.unlock_sim(sim_pin)?;
        self.wait_for_registration()?;

        self.set_apn(&apn)
            .map_err(|e| anyhow!("Failed to set APN: {e:?}"))?;
        if let Some(username) = username {
            self.set_apn_username(username)
                .map_err(|e| anyhow!("Failed to set APN username: {e:?}"))?;
        }
        if let Some(password) = password {
            self.set_apn_password(password)
                .map_err(|e| anyhow!("Failed to set APN password: {e:?}"))?;
        }
        self.execute(format_args!(
            "AT+UPSD={},6,{}",
            PROFILE, authorization as u8
        ))
        .map_err(|e| anyhow!("Failed to set authorization type: {e:?}"))?;

        let timeout = self.config.pdp_timeout();
        self.exchange(
            format_args!("AT+UPSDA={},3", PROFILE),
            &mut [],
            None,
            timeout,
        )
        .map_err(|e| anyhow!("Failed to activate data connection: {e:?}"))?;

        if !self
            .is_connected()
            .map_err(|e| anyhow!("Failed to query data connection: {e:?}"))?
        {
            return Err(anyhow!("Data connection did not come up"));
        }
        log::info!("Data connection active");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        let timeout = self.config.pdp_timeout();
        self.exchange(
            format_args!("AT+UPSDA={},4", PROFILE),
            &mut [],
            None,
            timeout,
        )?;
        log::info!("Data connection deactivated");
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool> {
        let timeout = self.config.read_timeout();
        let state: PacketSwitchedNetworkState = self.psd_param(8, timeout)?;
        Ok(state.param_val == 1)
    }

    fn network_status(&mut self) -> Result<NetworkRegistrationStatus> {
        let mut reg = Capture::<NetworkRegistration>::new("+CREG");
        let timeout = self.config.read_timeout();
        self.exchange(format_args!("AT+CREG?"), &mut [], Some(&mut reg), timeout)?;
        let reg = reg.take().ok_or(Error::NotFound)?;
        Ok(match reg.stat {
            0 | 2 => NetworkRegistrationStatus::NoNetwork,
            1 => NetworkRegistrationStatus::Home,
            3 => NetworkRegistrationStatus::Denied,
            5 => NetworkRegistrationStatus::Roaming,
            _ => NetworkRegistrationStatus::Unknown,
        })
    }

    fn network_technology(&mut self) -> Result<NetworkTechnology> {
        let mut cops = Capture::<OperatorSelection>::new("+COPS");
        let timeout = self.config.read_timeout();
        self.exchange(format_args!("AT+COPS?"), &mut [], Some(&mut cops), timeout)?;
        let cops = cops.take().ok_or(Error::NotFound)?;
        Ok(match cops.act {
            Some(0) | Some(1) => NetworkTechnology::Gsm,
            Some(2) => NetworkTechnology::Utran,
            Some(3) => NetworkTechnology::Edge,
            Some(4) => NetworkTechnology::Hsdpa,
            Some(5) => NetworkTechnology::Hsupa,
            Some(6) => NetworkTechnology::HsdpaHsupa,
            Some(7) => NetworkTechnology::Lte,
            _ => NetworkTechnology::Unknown,
        })
    }

    fn rssi_and_ber(&mut self) -> Result<(i8, u8)> {
        let mut csq = Capture::<SignalQuality>::new("+CSQ");
        let timeout = self.config.read_timeout();
        self.exchange(format_args!("AT+CSQ"), &mut [], Some(&mut csq), timeout)?;
        let csq = csq.take().ok_or(Error::NotFound)?;
        self.last_csq = csq.rssi;
        let dbm = match csq.rssi {
            rssi @ 0..=31 => -113 + 2 * rssi as i8,
            _ => 0,
        };
        Ok((dbm, csq.ber))
    }

    fn operator_name<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        // long alphanumeric format
        self.execute(format_args!("AT+COPS=3,0"))?;
        let mut cops = Capture::<OperatorSelection>::new("+COPS");
        let timeout = self.config.read_timeout();
        self.exchange(format_args!("AT+COPS?"), &mut [], Some(&mut cops), timeout)?;
        let name = cops
            .take()
            .and_then(|cops| cops.oper)
            .ok_or(Error::NotFound)?;
        copy_str(buf, &name)
    }

    fn mobile_directory_number<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        let mut cnum = Capture::<SubscriberNumber>::new("+CNUM");
        let timeout = self.config.read_timeout();
        self.exchange(format_args!("AT+CNUM"), &mut [], Some(&mut cnum), timeout)?;
        let number = cnum.take().ok_or(Error::NotFound)?.number;
        copy_str(buf, &number)
    }

    fn imei<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        self.query_line(format_args!("AT+CGSN"), buf, FirstLine::new())
    }

    fn ccid<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        self.query_line(format_args!("AT+CCID"), buf, FirstLine::with_prefix("+CCID:"))
    }

    fn imsi<'b>(&mut self, buf: &'b mut [u8]) -> Result<&'b str> {
        self.query_line(format_args!("AT+CIMI"), buf, FirstLine::new())
    }

    fn sim_status(&mut self) -> Result<SimStatus> {
        let mut pin = Capture::<PinStatus>::new("+CPIN");
        let timeout = self.config.read_timeout();
        match self.exchange(format_args!("AT+CPIN?"), &mut [], Some(&mut pin), timeout) {
            Ok(_) => {}
            Err(Error::Modem(Some(ErrorCode::Cme(SIM_NOT_INSERTED)))) => {
                return Ok(SimStatus::Missing)
            }
            Err(e) => return Err(e),
        }
        let status = pin.take().ok_or(Error::NotFound)?.status;
        Ok(match status.trim() {
            "READY" => SimStatus::Ready,
            "SIM PIN" => SimStatus::NeedsPin,
            other => {
                log::warn!("Unhandled SIM state: {}", other);
                SimStatus::Unknown
            }
        })
    }

    fn local_ip(&mut self) -> Result<Ipv4Addr> {
        let timeout = self.config.read_timeout();
        let data: PacketSwitchedNetworkData = self.psd_param(0, timeout)?;
        parse_ip(&data.param_val)
    }

    fn host_ip(&mut self, host: &str) -> Result<Ipv4Addr> {
        let mut resolved = Capture::<ResolvedName>::new("+UDNSRN");
        let timeout = self.config.dns_timeout();
        self.exchange(
            format_args!("AT+UDNSRN=0,\"{}\"", host),
            &mut [],
            Some(&mut resolved),
            timeout,
        )?;
        let resolved = resolved.take().ok_or(Error::NotFound)?;
        parse_ip(&resolved.ip)
    }
}
