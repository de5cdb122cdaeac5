use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Plugged,
    Unplugged,
}

impl ConnectionStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x02 => Some(ConnectionStatus::Plugged),
            0x03 => Some(ConnectionStatus::Unplugged),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionStatus::Plugged => "Plugged",
            ConnectionStatus::Unplugged => "Unplugged",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerRating {
    Charging,
    NotCharging,
    Shutdown,
    Dying,
    Low,
    High,
    Full,
}

impl PowerRating {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xEE => Some(PowerRating::Charging),
            0xF1 => Some(PowerRating::NotCharging),
            0x01 => Some(PowerRating::Shutdown),
            0x02 => Some(PowerRating::Dying),
            0x03 => Some(PowerRating::Low),
            0x04 => Some(PowerRating::High),
            0x05 => Some(PowerRating::Full),
            _ => None,
        }
    }
}

impl fmt::Display for PowerRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerRating::Charging => "Charging",
            PowerRating::NotCharging => "Not Charging",
            PowerRating::Shutdown => "Shutdown",
            PowerRating::Dying => "Dying",
            PowerRating::Low => "Low",
            PowerRating::High => "High",
            PowerRating::Full => "Full",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WirelessStatus {
    CableRumble,
    Cable,
    BluetoothRumble,
    Bluetooth,
}

impl WirelessStatus {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x10 => Some(WirelessStatus::CableRumble),
            0x12 => Some(WirelessStatus::Cable),
            0x14 => Some(WirelessStatus::BluetoothRumble),
            0x16 => Some(WirelessStatus::Bluetooth),
            _ => None,
        }
    }
}

impl fmt::Display for WirelessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WirelessStatus::CableRumble => "Cable - Rumble is on",
            WirelessStatus::Cable => "Cable - Rumble is off",
            WirelessStatus::BluetoothRumble => "Bluetooth - Rumble is on",
            WirelessStatus::Bluetooth => "Bluetooth - Rumble is off",
        })
    }
}

fn or_error<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "Error".to_string(), |v| v.to_string())
}

fn power_text(byte: u8) -> String {
    PowerRating::from_byte(byte).map_or_else(|| format!("Error: {}", byte), |p| p.to_string())
}

/// Gamepad and navigation status line
pub fn sixaxis_status_line(connection: u8, power: u8, wireless: u8) -> String {
    format!(
        "ConnectionStatus: {} - PowerRating: {} - WirelessStatus: {}",
        or_error(ConnectionStatus::from_byte(connection)),
        power_text(power),
        or_error(WirelessStatus::from_byte(wireless)),
    )
}

/// Motion controller status line
pub fn motion_status_line(power: u8) -> String {
    format!("PowerRating: {}", power_text(power))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_known_codes() {
        assert_eq!(
            sixaxis_status_line(0x02, 0xEE, 0x16),
            "ConnectionStatus: Plugged - PowerRating: Charging - WirelessStatus: Bluetooth - Rumble is off"
        );
        assert_eq!(motion_status_line(0x05), "PowerRating: Full");
    }

    #[test]
    fn renders_unknown_codes() {
        assert_eq!(
            sixaxis_status_line(0x00, 0x42, 0x00),
            "ConnectionStatus: Error - PowerRating: Error: 66 - WirelessStatus: Error"
        );
        assert_eq!(motion_status_line(0xAA), "PowerRating: Error: 170");
    }
}
