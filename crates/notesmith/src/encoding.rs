use crate::melody::{MELODY_NOTE_OFF, MELODY_NO_EVENT};
use crate::performance::{PerformanceEvent, PerformanceEventKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventRange {
    kind: PerformanceEventKind,
    min: i32,
    max: i32,
}

impl EventRange {
    fn size(&self) -> usize {
        (self.max - self.min + 1) as usize
    }
}

/// Maps performance events to dense class indices and back.
///
/// Classes pack note-ons, note-offs, time shifts, then velocity bins,
/// contiguously in that order. Time shift zero has no class; encoders
/// never emit it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceOneHotEncoding {
    ranges: Vec<EventRange>,
}

impl PerformanceOneHotEncoding {
    pub fn new(velocity_bins: u8, max_shift_steps: u32) -> Result<PerformanceOneHotEncoding> {
        if velocity_bins > 127 {
            return Err(Error::InvalidVelocityBins(velocity_bins));
        }
        if max_shift_steps == 0 {
            return Err(Error::InvalidMaxShift(max_shift_steps));
        }
        let mut ranges = vec![
            EventRange {
                kind: PerformanceEventKind::NoteOn,
                min: 0,
                max: 127,
            },
            EventRange {
                kind: PerformanceEventKind::NoteOff,
                min: 0,
                max: 127,
            },
            EventRange {
                kind: PerformanceEventKind::TimeShift,
                min: 1,
                max: max_shift_steps as i32,
            },
        ];
        if velocity_bins > 0 {
            ranges.push(EventRange {
                kind: PerformanceEventKind::Velocity,
                min: 1,
                max: velocity_bins as i32,
            });
        }
        Ok(PerformanceOneHotEncoding { ranges })
    }

    pub fn num_classes(&self) -> usize {
        self.ranges.iter().map(EventRange::size).sum()
    }

    pub fn encode(&self, event: &PerformanceEvent) -> Result<usize> {
        let mut offset = 0usize;
        for range in &self.ranges {
            if range.kind == event.kind() {
                let value = event.value();
                if (range.min..=range.max).contains(&value) {
                    return Ok(offset + (value - range.min) as usize);
                }
                break;
            }
            offset += range.size();
        }
        Err(Error::UnencodablePerformanceEvent(*event))
    }

    pub fn decode(&self, index: usize) -> Result<PerformanceEvent> {
        let num_classes = self.num_classes();
        if index >= num_classes {
            return Err(Error::IndexOutOfRange { index, num_classes });
        }
        let mut offset = 0usize;
        for range in &self.ranges {
            if index < offset + range.size() {
                return PerformanceEvent::new(range.kind, range.min + (index - offset) as i32);
            }
            offset += range.size();
        }
        Err(Error::IndexOutOfRange { index, num_classes })
    }
}

/// Maps melody step events to dense class indices: class 0 is
/// no-event, class 1 is note-off, then one class per pitch of
/// `[min_note, max_note)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelodyOneHotEncoding {
    min_note: u8,
    max_note: u8,
}

impl MelodyOneHotEncoding {
    /// `max_note` is exclusive and at most 128.
    pub fn new(min_note: u8, max_note: u8) -> Result<MelodyOneHotEncoding> {
        if max_note <= min_note || max_note > 128 {
            return Err(Error::InvalidEncoderBounds { min_note, max_note });
        }
        Ok(MelodyOneHotEncoding { min_note, max_note })
    }

    pub fn num_classes(&self) -> usize {
        2 + (self.max_note - self.min_note) as usize
    }

    pub fn min_note(&self) -> u8 {
        self.min_note
    }

    pub fn max_note(&self) -> u8 {
        self.max_note
    }

    pub fn encode(&self, event: i16) -> Result<usize> {
        if event == MELODY_NO_EVENT {
            return Ok(0);
        }
        if event == MELODY_NOTE_OFF {
            return Ok(1);
        }
        if event >= self.min_note as i16 && event < self.max_note as i16 {
            return Ok(2 + (event - self.min_note as i16) as usize);
        }
        Err(Error::UnencodableMelodyEvent(event))
    }

    pub fn decode(&self, index: usize) -> Result<i16> {
        let num_classes = self.num_classes();
        if index >= num_classes {
            return Err(Error::IndexOutOfRange { index, num_classes });
        }
        Ok(match index {
            0 => MELODY_NO_EVENT,
            1 => MELODY_NOTE_OFF,
            _ => self.min_note as i16 + (index - 2) as i16,
        })
    }
}
