//! Catalog-driven reads over an opaque controller transport.
//!
//! The controller wire protocol is not this crate's business: it hides
//! behind [`PointTransport`], which only knows how to fetch raw bytes from
//! a data block. [`ControllerReader`] walks the point catalog, reads each
//! point at its declared offset and width, decodes it, and assembles the
//! complete snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use pumpwatch_types::{Catalog, PointKind, PointValue, PumpSnapshot, SystemSnapshot};

use crate::{DeviceReader, ReadError};

/// Byte-level access to one controller data block.
///
/// Implementations own the actual protocol binding (socket, driver, test
/// script). `read_bytes` returns exactly `len` bytes starting at `offset`
/// within data block `db`.
#[async_trait]
pub trait PointTransport: Send {
    async fn connect(&mut self) -> Result<(), ReadError>;

    async fn disconnect(&mut self);

    async fn read_bytes(&mut self, db: u16, offset: u16, len: u16) -> Result<Vec<u8>, ReadError>;

    fn is_connected(&self) -> bool;
}

/// Reads every catalogued point from a controller data block.
///
/// A failed or short point read records the point's fallback value (false
/// for booleans, 0.0 for reals) and logs at debug; only a lost connection
/// fails the whole read.
pub struct ControllerReader<T> {
    transport: T,
    catalog: Arc<Catalog>,
    data_block: u16,
    description: String,
}

impl<T: PointTransport> ControllerReader<T> {
    pub fn new(transport: T, catalog: Arc<Catalog>, data_block: u16, endpoint: &str) -> Self {
        let description = format!("controller: {} (DB{})", endpoint, data_block);
        Self {
            transport,
            catalog,
            data_block,
            description,
        }
    }
}

#[async_trait]
impl<T: PointTransport> DeviceReader for ControllerReader<T> {
    async fn connect(&mut self) -> Result<(), ReadError> {
        self.transport.connect().await
    }

    async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    async fn read(&mut self) -> Result<SystemSnapshot, ReadError> {
        if !self.transport.is_connected() {
            return Err(ReadError::NotConnected);
        }

        let timestamp = Utc::now();
        let mut pumps = BTreeMap::new();

        for pump_id in self.catalog.pump_ids() {
            let mut pump = PumpSnapshot::empty(pump_id);

            for point in self.catalog.points_for(pump_id) {
                let value = match self
                    .transport
                    .read_bytes(self.data_block, point.offset, point.width())
                    .await
                {
                    Ok(bytes) => decode_point(point.kind, &bytes).unwrap_or_else(|| {
                        debug!(
                            pump_id,
                            parameter = %point.parameter,
                            got = bytes.len(),
                            want = point.width(),
                            "short point read, using fallback value"
                        );
                        PointValue::fallback(point.kind)
                    }),
                    // Connection loss fails the whole cycle; anything else
                    // degrades to the point's fallback value.
                    Err(err @ (ReadError::Connection(_) | ReadError::NotConnected)) => {
                        return Err(err);
                    }
                    Err(err) => {
                        debug!(
                            pump_id,
                            parameter = %point.parameter,
                            error = %err,
                            "point read failed, using fallback value"
                        );
                        PointValue::fallback(point.kind)
                    }
                };
                pump.set(point.parameter, value);
            }

            pumps.insert(pump_id, pump);
        }

        Ok(SystemSnapshot::new(timestamp, pumps))
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    fn description(&self) -> &str {
        &self.description
    }
}

/// Decode raw point bytes: 1 byte for Bool, 4 big-endian bytes for Real.
fn decode_point(kind: PointKind, bytes: &[u8]) -> Option<PointValue> {
    match kind {
        PointKind::Bool => bytes.first().map(|b| PointValue::Bool(*b != 0)),
        PointKind::Real => {
            let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
            Some(PointValue::Real(f64::from(f32::from_be_bytes(raw))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pumpwatch_types::Parameter;

    /// Transport backed by a fixed byte image of the data block, with an
    /// optional set of offsets that fail to read.
    struct ScriptedTransport {
        image: Vec<u8>,
        failing_offsets: Vec<u16>,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(image: Vec<u8>) -> Self {
            Self {
                image,
                failing_offsets: Vec::new(),
                connected: false,
            }
        }
    }

    #[async_trait]
    impl PointTransport for ScriptedTransport {
        async fn connect(&mut self) -> Result<(), ReadError> {
            self.connected = true;
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }

        async fn read_bytes(
            &mut self,
            _db: u16,
            offset: u16,
            len: u16,
        ) -> Result<Vec<u8>, ReadError> {
            if self.failing_offsets.contains(&offset) {
                return Err(ReadError::Transport("scripted failure".to_string()));
            }
            let start = usize::from(offset);
            let end = start + usize::from(len);
            self.image
                .get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| ReadError::Transport("out of range".to_string()))
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    /// Build a data block image with pump 3 running at known values.
    fn image_with_pump3() -> Vec<u8> {
        let mut image = vec![0u8; 128];
        let catalog = Catalog::reference();

        let set_bool = |image: &mut Vec<u8>, param, v: bool| {
            let offset = catalog.spec(3, param).unwrap().offset;
            image[usize::from(offset)] = u8::from(v);
        };
        let set_real = |image: &mut Vec<u8>, param, v: f32| {
            let offset = usize::from(catalog.spec(3, param).unwrap().offset);
            image[offset..offset + 4].copy_from_slice(&v.to_be_bytes());
        };

        set_bool(&mut image, Parameter::Ready, true);
        set_bool(&mut image, Parameter::Running, true);
        set_real(&mut image, Parameter::Pressure, 5.25);
        set_real(&mut image, Parameter::Speed, 31.5);
        set_real(&mut image, Parameter::PressureSetpoint, 6.1);
        image
    }

    #[tokio::test]
    async fn decodes_bools_and_reals_from_the_block_image() {
        let catalog = Arc::new(Catalog::reference());
        let mut reader =
            ControllerReader::new(ScriptedTransport::new(image_with_pump3()), catalog, 39, "test");
        reader.connect().await.unwrap();

        let snapshot = reader.read().await.unwrap();
        assert_eq!(snapshot.len(), 7);

        let pump = snapshot.pump(3).unwrap();
        assert!(pump.ready);
        assert!(pump.running);
        assert!(!pump.trip);
        assert!((pump.pressure - 5.25).abs() < 1e-6);
        assert!((pump.speed - 31.5).abs() < 1e-6);
        assert!((pump.pressure_setpoint - 6.1).abs() < 1e-6);

        // Untouched pumps decode to all-off, all-zero.
        let idle = snapshot.pump(5).unwrap();
        assert!(!idle.ready && !idle.running && !idle.trip);
        assert_eq!(idle.pressure, 0.0);
    }

    #[tokio::test]
    async fn failed_point_read_degrades_to_fallback_value() {
        let catalog = Arc::new(Catalog::reference());
        let mut transport = ScriptedTransport::new(image_with_pump3());
        // Pump 3's pressure and running points fail to read.
        transport.failing_offsets = vec![
            catalog.spec(3, Parameter::Pressure).unwrap().offset,
            catalog.spec(3, Parameter::Running).unwrap().offset,
        ];

        let mut reader = ControllerReader::new(transport, catalog, 39, "test");
        reader.connect().await.unwrap();

        let snapshot = reader.read().await.unwrap();
        let pump = snapshot.pump(3).unwrap();
        assert_eq!(pump.pressure, 0.0);
        assert!(!pump.running);
        // Other points of the same pump still decode.
        assert!(pump.ready);
        assert!((pump.speed - 31.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn read_without_connection_fails_whole_cycle() {
        let catalog = Arc::new(Catalog::reference());
        let mut reader =
            ControllerReader::new(ScriptedTransport::new(vec![0; 128]), catalog, 39, "test");

        let err = reader.read().await.unwrap_err();
        assert!(matches!(err, ReadError::NotConnected));
    }

    #[test]
    fn decode_point_handles_short_buffers() {
        assert_eq!(decode_point(PointKind::Bool, &[]), None);
        assert_eq!(decode_point(PointKind::Real, &[0, 1]), None);
        assert_eq!(decode_point(PointKind::Bool, &[2]), Some(PointValue::Bool(true)));
        assert_eq!(
            decode_point(PointKind::Real, &1.5f32.to_be_bytes()),
            Some(PointValue::Real(1.5))
        );
    }
}
