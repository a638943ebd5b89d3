use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Serial line settings, fixed when the port is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialParams {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub write_timeout_ms: u64,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            flow_control: FlowControl::None,
            write_timeout_ms: 100,
        }
    }
}

impl SerialParams {
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(DriverError::InvalidConfig {
                reason: "baud_rate must be positive".into(),
            });
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(DriverError::InvalidConfig {
                reason: format!("data_bits must be 5..=8, got {}", self.data_bits),
            });
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(DriverError::InvalidConfig {
                reason: format!("stop_bits must be 1 or 2, got {}", self.stop_bits),
            });
        }
        Ok(())
    }
}

#[cfg(feature = "serial")]
mod port {
    use std::cell::RefCell;
    use std::io::{ErrorKind, Read, Write};
    use std::rc::Rc;
    use std::time::Duration;

    use isn_layer::{Counters, DriverStats, Layer, LayerError, LayerRef, Node};
    use serialport::SerialPort;
    use tracing::{debug, info};

    use super::{FlowControl, Parity, SerialParams};
    use crate::channel::{deliver, DuplexChannel};
    use crate::error::{DriverError, Result};

    const READ_CHUNK: usize = 256;

    fn data_bits(bits: u8) -> serialport::DataBits {
        match bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        }
    }

    fn stop_bits(bits: u8) -> serialport::StopBits {
        match bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        }
    }

    fn parity(parity: Parity) -> serialport::Parity {
        match parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }

    fn flow_control(flow: FlowControl) -> serialport::FlowControl {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }

    /// Serial port driver.
    pub struct SerialChannel {
        node: Node,
        path: String,
        port: RefCell<Box<dyn SerialPort>>,
        params: SerialParams,
        counters: Counters,
    }

    impl SerialChannel {
        /// Open and configure a serial port.
        pub fn open(path: &str, params: SerialParams) -> Result<Rc<Self>> {
            params.validate()?;
            let port = serialport::new(path, params.baud_rate)
                .data_bits(data_bits(params.data_bits))
                .stop_bits(stop_bits(params.stop_bits))
                .parity(parity(params.parity))
                .flow_control(flow_control(params.flow_control))
                .timeout(Duration::from_millis(params.write_timeout_ms))
                .open()
                .map_err(|e| DriverError::Open {
                    path: path.to_string(),
                    source: e,
                })?;
            info!(path, baud = params.baud_rate, "opened serial port");

            Ok(Rc::new(Self {
                node: Node::new("serial"),
                path: path.to_string(),
                port: RefCell::new(port),
                params,
                counters: Counters::new(),
            }))
        }

        /// Link the driver to the layer receiving its input.
        pub fn init(&self, parent: Option<LayerRef>) -> isn_layer::Result<()> {
            self.node.init(None, parent)
        }

        pub fn path(&self) -> &str {
            &self.path
        }

        pub fn params(&self) -> &SerialParams {
            &self.params
        }

        fn set_timeout(&self, timeout: Duration) -> isn_layer::Result<()> {
            self.port
                .borrow_mut()
                .set_timeout(timeout)
                .map_err(|e| LayerError::Io(e.into()))
        }
    }

    impl DuplexChannel for SerialChannel {
        fn write(&self, bytes: &[u8]) -> isn_layer::Result<usize> {
            self.set_timeout(Duration::from_millis(self.params.write_timeout_ms))?;
            let result = self.port.borrow_mut().write_all(bytes);
            match result {
                Ok(()) => {
                    self.counters.tx_packet(bytes.len());
                    Ok(bytes.len())
                }
                Err(err) if err.kind() == ErrorKind::TimedOut => {
                    debug!(path = %self.path, "serial write timed out");
                    self.counters.tx_dropped();
                    Ok(0)
                }
                Err(err) => Err(err.into()),
            }
        }

        fn poll(&self, timeout: Duration) -> isn_layer::Result<usize> {
            self.node.ensure_initialized()?;
            self.set_timeout(timeout)?;
            let mut buf = [0u8; READ_CHUNK];
            let mut processed = 0;
            loop {
                let read = self.port.borrow_mut().read(&mut buf);
                match read {
                    Ok(0) => break,
                    Ok(len) => {
                        processed += len;
                        deliver(&self.node, &self.counters, &buf[..len]);
                        if len < READ_CHUNK {
                            break;
                        }
                        // More may be buffered; do not wait for it.
                        self.set_timeout(Duration::ZERO)?;
                    }
                    Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                        break
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            Ok(processed)
        }
    }

    impl Layer for SerialChannel {
        fn name(&self) -> &'static str {
            "serial"
        }

        fn recv(&self, _buf: &[u8]) -> isn_layer::Result<usize> {
            Err(LayerError::Unsupported {
                layer: "serial",
                operation: "recv",
            })
        }

        fn send(&self, buf: &[u8]) -> isn_layer::Result<usize> {
            self.write(buf)
        }

        fn capacity(&self) -> usize {
            usize::MAX
        }

        fn stats(&self) -> DriverStats {
            self.counters.snapshot()
        }
    }
}

#[cfg(feature = "serial")]
pub use port::SerialChannel;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let params = SerialParams::default();
        assert_eq!(params.baud_rate, 115_200);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn out_of_range_params_rejected() {
        let params = SerialParams {
            data_bits: 9,
            ..SerialParams::default()
        };
        assert!(matches!(
            params.validate(),
            Err(DriverError::InvalidConfig { .. })
        ));

        let params = SerialParams {
            stop_bits: 3,
            ..SerialParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn params_from_json() {
        let params: SerialParams =
            serde_json::from_str(r#"{"baud_rate": 9600, "parity": "even", "flow_control": "hardware"}"#)
                .unwrap();
        assert_eq!(params.baud_rate, 9600);
        assert_eq!(params.parity, Parity::Even);
        assert_eq!(params.flow_control, FlowControl::Hardware);
        assert_eq!(params.data_bits, 8);
    }
}
