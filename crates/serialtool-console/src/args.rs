//! Command-line arguments and their mapping onto core configuration

use clap::{Args, ValueEnum};
use serialtool_core::codec::TextEncoding;
use serialtool_core::session::{
    DataBits, Parity, PortConfiguration, ReceiveMode, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum StopBitsArg {
    #[value(name = "0")]
    None,
    #[value(name = "1")]
    One,
    #[value(name = "1.5")]
    OnePointFive,
    #[value(name = "2")]
    Two,
}

impl From<StopBitsArg> for serialtool_core::session::StopBits {
    fn from(arg: StopBitsArg) -> Self {
        use serialtool_core::session::StopBits;
        match arg {
            StopBitsArg::None => StopBits::None,
            StopBitsArg::One => StopBits::One,
            StopBitsArg::OnePointFive => StopBits::OnePointFive,
            StopBitsArg::Two => StopBits::Two,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

impl From<ParityArg> for Parity {
    fn from(arg: ParityArg) -> Self {
        match arg {
            ParityArg::None => Parity::None,
            ParityArg::Odd => Parity::Odd,
            ParityArg::Even => Parity::Even,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Received bytes are pushed as they arrive
    Response,
    /// Received bytes wait for `:read`
    #[value(alias = "ack")]
    Acknowledgment,
}

impl From<ModeArg> for ReceiveMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Response => ReceiveMode::Response,
            ModeArg::Acknowledgment => ReceiveMode::Acknowledgment,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    #[value(name = "utf8", alias = "utf-8")]
    Utf8,
    Ascii,
    #[value(name = "latin1", alias = "iso-8859-1")]
    Latin1,
}

impl From<EncodingArg> for TextEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf8 => TextEncoding::Utf8,
            EncodingArg::Ascii => TextEncoding::Ascii,
            EncodingArg::Latin1 => TextEncoding::Latin1,
        }
    }
}

/// Port settings shared by `open` and the interactive `:open`
#[derive(Args, Debug, Clone)]
pub struct PortArgs {
    /// Port name, e.g. /dev/ttyUSB0 or COM3
    pub port: String,

    /// Baud rate
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Data bits (5-8)
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8))]
    pub data_bits: u8,

    /// Stop bits
    #[arg(long, value_enum, default_value = "1")]
    pub stop_bits: StopBitsArg,

    /// Parity
    #[arg(long, value_enum, default_value = "none")]
    pub parity: ParityArg,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub read_timeout: u64,

    /// Write timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    pub write_timeout: u64,
}

impl PortArgs {
    pub fn to_configuration(&self) -> anyhow::Result<PortConfiguration> {
        let data_bits = DataBits::try_from(self.data_bits)?;
        Ok(PortConfiguration::new(&self.port, self.baud)
            .with_data_bits(data_bits)
            .with_stop_bits(self.stop_bits.into())
            .with_parity(self.parity.into())
            .with_timeouts(self.read_timeout, self.write_timeout))
    }
}
