use std::{io::Read, time::Duration};

use bytes::Bytes;
use serialport::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SourceError;

pub type ChunkReceiver = mpsc::Receiver<Result<Bytes, SourceError>>;

const READ_BUFFER_SIZE: usize = 1024;
const CHUNK_CHANNEL_SIZE: usize = 256;
// Short read timeout so the blocking loop notices cancellation.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
}

/// Whether the platform lists a serial port at `path`.
pub fn device_attached(path: &str) -> bool {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::warn!("serial: list ports failed: {}", e);
            return false;
        }
    };
    if ports.iter().any(|p| p.port_name == path) {
        return true;
    }
    log::debug!("serial: {} not listed, available ports:", path);
    for port in &ports {
        log::debug!("serial:   {}", describe_port(port));
    }
    false
}

fn describe_port(port: &SerialPortInfo) -> String {
    match &port.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "{} (usb {:04x}:{:04x}, {})",
            port.port_name,
            usb.vid,
            usb.pid,
            usb.manufacturer.as_deref().unwrap_or("unknown manufacturer")
        ),
        SerialPortType::PciPort => format!("{} (pci)", port.port_name),
        SerialPortType::BluetoothPort => format!("{} (bluetooth)", port.port_name),
        SerialPortType::Unknown => port.port_name.clone(),
    }
}

/// An opened serial device, not yet reading.
pub struct SerialSource {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SerialSource {
    pub fn open(config: &SerialConfig) -> Result<Self, SourceError> {
        let port = serialport::new(&config.path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| match source.kind() {
                serialport::ErrorKind::NoDevice => SourceError::NoDevice(config.path.clone()),
                _ => SourceError::Open {
                    path: config.path.clone(),
                    source,
                },
            })?;

        log::info!(
            "serial: opened {} at {} baud",
            config.path,
            config.baud_rate
        );
        Ok(Self {
            path: config.path.clone(),
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Starts the blocking read loop. The receiver yields raw chunks and
    /// ends after the first read error.
    pub fn start(self, cancel: CancellationToken) -> ChunkReceiver {
        spawn_reader(self.port, cancel)
    }
}

/// Pumps `reader` on a blocking thread into a channel of byte chunks.
///
/// Read timeouts are retried; end of stream and any other error are sent
/// once and stop the loop.
pub fn spawn_reader<R>(mut reader: R, cancel: CancellationToken) -> ChunkReceiver
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_SIZE);
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let chunk = match reader.read(&mut buf) {
                Ok(0) => Err(SourceError::Read(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "device closed",
                ))),
                Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Err(SourceError::Read(e)),
            };
            let failed = chunk.is_err();
            if tx.blocking_send(chunk).is_err() || failed {
                break;
            }
        }
        log::debug!("serial: read loop finished");
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct FlakyReader {
        reads: Vec<std::io::Result<Vec<u8>>>,
    }

    impl Read for FlakyReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.reads.is_empty() {
                return Ok(0);
            }
            let data = self.reads.remove(0)?;
            buf[..data.len()].copy_from_slice(&data);
            Ok(data.len())
        }
    }

    #[tokio::test]
    async fn test_reader_forwards_chunks_then_reports_eof() {
        let mut rx = spawn_reader(Cursor::new(b"ax:1\n".to_vec()), CancellationToken::new());
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(&chunk[..], b"ax:1\n");
        assert!(matches!(rx.recv().await, Some(Err(SourceError::Read(_)))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_reader_retries_timeouts() {
        let reader = FlakyReader {
            reads: vec![
                Err(std::io::ErrorKind::TimedOut.into()),
                Ok(b"a".to_vec()),
                Err(std::io::ErrorKind::TimedOut.into()),
                Ok(b"b".to_vec()),
                Err(std::io::ErrorKind::BrokenPipe.into()),
                Ok(b"never".to_vec()),
            ],
        };
        let mut rx = spawn_reader(reader, CancellationToken::new());
        assert_eq!(&rx.recv().await.unwrap().unwrap()[..], b"a");
        assert_eq!(&rx.recv().await.unwrap().unwrap()[..], b"b");
        match rx.recv().await {
            Some(Err(SourceError::Read(e))) => {
                assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe)
            }
            _ => panic!("expected read error"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_reader_stops() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = spawn_reader(Cursor::new(b"data".to_vec()), cancel);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_open_missing_device_fails() {
        let config = SerialConfig {
            path: "/dev/imu-relay-does-not-exist".to_string(),
            baud_rate: 115_200,
        };
        assert!(SerialSource::open(&config).is_err());
        assert!(!device_attached(&config.path));
    }

    #[test]
    fn test_describe_port_names_manufacturer() {
        let usb = SerialPortInfo {
            port_name: "/dev/ttyUSB0".to_string(),
            port_type: SerialPortType::UsbPort(serialport::UsbPortInfo {
                vid: 0x10c4,
                pid: 0xea60,
                serial_number: None,
                manufacturer: Some("Silicon Labs".to_string()),
                product: None,
            }),
        };
        assert_eq!(
            describe_port(&usb),
            "/dev/ttyUSB0 (usb 10c4:ea60, Silicon Labs)"
        );

        let plain = SerialPortInfo {
            port_name: "/dev/ttyS0".to_string(),
            port_type: SerialPortType::Unknown,
        };
        assert_eq!(describe_port(&plain), "/dev/ttyS0");
    }
}
