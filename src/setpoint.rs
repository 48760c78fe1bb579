// src/setpoint.rs - Alarm setpoint block read/write
use crate::{
    config::SetpointConfig,
    decode::{decode, encode_real},
    error::{ConfigError, DecodeError, PlcError, Result},
    reader::RegisterReader,
    value::ValueType,
};
use std::sync::Arc;
use tracing::info;

/// Consecutive REAL setpoints stored from byte 0 of one data block, four
/// bytes each.
pub struct SetpointClient {
    reader: Arc<RegisterReader>,
    config: SetpointConfig,
}

impl SetpointClient {
    pub fn new(reader: Arc<RegisterReader>, config: SetpointConfig) -> Self {
        Self { reader, config }
    }

    fn offset(index: usize) -> u32 {
        (index * ValueType::Float32.byte_len()) as u32
    }

    /// Read all setpoints in one block request.
    pub async fn read_all(&self) -> Result<Vec<f32>> {
        let width = ValueType::Float32.byte_len();
        let bytes = self
            .reader
            .read_block(self.config.db, 0, self.config.count * width)
            .await?;

        let mut values = Vec::with_capacity(self.config.count);
        for chunk in bytes.chunks(width) {
            values.extend(decode(ValueType::Float32, chunk, None)?.as_real());
        }
        if values.len() != self.config.count {
            return Err(PlcError::Decode(DecodeError::LengthMismatch {
                expected: self.config.count * width,
                actual: bytes.len(),
            }));
        }
        Ok(values)
    }

    /// Write one setpoint by index.
    pub async fn write(&self, index: usize, value: f32) -> Result<()> {
        if index >= self.config.count {
            return Err(PlcError::Config(ConfigError::Invalid(format!(
                "setpoint index {} out of range (0..{})",
                index, self.config.count
            ))));
        }
        if !value.is_finite() {
            return Err(PlcError::Config(ConfigError::Invalid(format!(
                "setpoint {} must be finite",
                index
            ))));
        }

        self.reader
            .write_block(self.config.db, Self::offset(index), &encode_real(value))
            .await?;
        info!(db = self.config.db, index, value, "Setpoint written");
        Ok(())
    }

    /// Write every setpoint, in order. Stops at the first failure.
    pub async fn write_all(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.config.count {
            return Err(PlcError::Config(ConfigError::Invalid(format!(
                "expected {} setpoints, got {}",
                self.config.count,
                values.len()
            ))));
        }
        for (index, value) in values.iter().enumerate() {
            self.write(index, *value).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{SimulatedController, SimulatedHandle};
    use std::time::Duration;

    async fn client() -> (SetpointClient, SimulatedHandle) {
        let (plc, handle) = SimulatedController::new();
        handle.set_bytes(36, 0, &[0u8; 20]);
        let reader = Arc::new(RegisterReader::new(Box::new(plc), Duration::from_millis(100)));
        reader.connect().await.unwrap();
        (SetpointClient::new(reader, SetpointConfig { db: 36, count: 5 }), handle)
    }

    #[tokio::test]
    async fn test_read_all() {
        let (client, handle) = client().await;
        handle.set_real(36, 0, 36.0);
        handle.set_real(36, 16, 80.5);
        assert_eq!(client.read_all().await.unwrap(), vec![36.0, 0.0, 0.0, 0.0, 80.5]);
    }

    #[tokio::test]
    async fn test_write_lands_at_index_offset() {
        let (client, handle) = client().await;
        client.write(2, 42.25).await.unwrap();
        assert_eq!(handle.bytes(36, 8, 4).unwrap(), 42.25f32.to_be_bytes().to_vec());
        assert_eq!(handle.writes(), vec![(36, 8, 42.25f32.to_be_bytes().to_vec())]);
    }

    #[tokio::test]
    async fn test_write_rejects_bad_input() {
        let (client, handle) = client().await;
        assert!(client.write(5, 1.0).await.is_err());
        assert!(client.write(0, f32::NAN).await.is_err());
        assert!(client.write_all(&[1.0, 2.0]).await.is_err());
        assert!(handle.writes().is_empty());
    }
}
