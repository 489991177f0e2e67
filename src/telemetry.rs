// Telemetry - fixed-width binary records of per-body state
//
// Record layout (little-endian, 108 bytes):
//   u32 body index | f64 timestamp | 3×f64 position | 3×f64 velocity
//   | 3×f64 acceleration | 3×f64 force

use log::debug;
use std::io::Write;

use crate::error::SimResult;
use crate::state_manager::Snapshot;

pub const RECORD_SIZE: usize = 4 + 8 * 13;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryRecord {
    pub body_index: u32,
    pub timestamp: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub acceleration: [f64; 3],
    pub force: [f64; 3],
}

impl TelemetryRecord {
    /// One record per body in the snapshot
    pub fn from_snapshot(snapshot: &Snapshot) -> Vec<TelemetryRecord> {
        snapshot
            .bodies
            .iter()
            .enumerate()
            .map(|(index, body)| TelemetryRecord {
                body_index: index as u32,
                timestamp: snapshot.sim_time,
                position: body.position,
                velocity: body.velocity,
                acceleration: body.acceleration,
                force: body.force,
            })
            .collect()
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.body_index.to_le_bytes());
        buf[4..12].copy_from_slice(&self.timestamp.to_le_bytes());

        let fields = self
            .position
            .iter()
            .chain(self.velocity.iter())
            .chain(self.acceleration.iter())
            .chain(self.force.iter());
        for (i, value) in fields.enumerate() {
            let offset = 12 + i * 8;
            buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RECORD_SIZE {
            return None;
        }
        let f64_at = |offset: usize| -> Option<f64> {
            let raw: [u8; 8] = bytes.get(offset..offset + 8)?.try_into().ok()?;
            Some(f64::from_le_bytes(raw))
        };
        let vec_at = |field: usize| -> Option<[f64; 3]> {
            let base = 12 + field * 24;
            Some([f64_at(base)?, f64_at(base + 8)?, f64_at(base + 16)?])
        };

        let index: [u8; 4] = bytes.get(0..4)?.try_into().ok()?;
        Some(Self {
            body_index: u32::from_le_bytes(index),
            timestamp: f64_at(4)?,
            position: vec_at(0)?,
            velocity: vec_at(1)?,
            acceleration: vec_at(2)?,
            force: vec_at(3)?,
        })
    }
}

/// Appends telemetry records to any writer
pub struct TelemetryWriter<W: Write> {
    writer: W,
    records_written: u64,
}

impl<W: Write> TelemetryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            records_written: 0,
        }
    }

    pub fn write_record(&mut self, record: &TelemetryRecord) -> SimResult<()> {
        self.writer.write_all(&record.to_bytes())?;
        self.records_written += 1;
        Ok(())
    }

    /// Write every body of the snapshot, returning the number of records
    pub fn write_snapshot(&mut self, snapshot: &Snapshot) -> SimResult<usize> {
        let records = TelemetryRecord::from_snapshot(snapshot);
        for record in &records {
            self.write_record(record)?;
        }
        debug!("telemetry: {} records at t = {:.1} s", records.len(), snapshot.sim_time);
        Ok(records.len())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn flush(&mut self) -> SimResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vector3;
    use crate::physics_engine::{SimulationSettings, SimulationState};

    #[test]
    fn test_record_layout() {
        let record = TelemetryRecord {
            body_index: 7,
            timestamp: 12.5,
            position: [1.0, 2.0, 3.0],
            velocity: [4.0, 5.0, 6.0],
            acceleration: [7.0, 8.0, 9.0],
            force: [10.0, 11.0, 12.0],
        };
        let bytes = record.to_bytes();
        assert_eq!(bytes.len(), 108);
        assert_eq!(&bytes[0..4], &7u32.to_le_bytes());
        assert_eq!(&bytes[4..12], &12.5f64.to_le_bytes());
        assert_eq!(&bytes[100..108], &12.0f64.to_le_bytes());
        assert_eq!(TelemetryRecord::from_bytes(&bytes), Some(record));
        assert!(TelemetryRecord::from_bytes(&bytes[..100]).is_none());
    }

    #[test]
    fn test_writer_appends_one_record_per_body() {
        let mut state = SimulationState::new(SimulationSettings {
            time_step: 10.0,
            start_running: true,
            ..Default::default()
        });
        state
            .bodies
            .add_body("a", 1e24, Some(1e6), Vector3::zero(), Vector3::zero())
            .unwrap();
        state
            .bodies
            .add_body("b", 1e22, Some(1e5), Vector3::planar(1e8, 0.0), Vector3::planar(0.0, 800.0))
            .unwrap();
        state.tick().unwrap();

        let mut writer = TelemetryWriter::new(Vec::new());
        assert_eq!(writer.write_snapshot(&state.snapshot()).unwrap(), 2);
        assert_eq!(writer.records_written(), 2);

        let bytes = writer.into_inner();
        assert_eq!(bytes.len(), 2 * RECORD_SIZE);

        let second = TelemetryRecord::from_bytes(&bytes[RECORD_SIZE..]).unwrap();
        assert_eq!(second.body_index, 1);
        assert_eq!(second.timestamp, 10.0);
        assert!(second.force[0] < 0.0, "b is pulled toward a");
        assert_eq!(second.position, state.bodies.get(1).unwrap().position.to_array());
    }
}
