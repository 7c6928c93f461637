//! DSLogic capture files
//!
//! A `.dsl` file is a zip archive with a `header` entry and one packed bit
//! stream per probe and block, named `L-{probe}/{block}`. Bit `n` of a block
//! is sample `block * samples_per_block + n` of that probe, LSB first.
//!
//! [`DslCapture`] loads all blocks and interleaves them into one
//! [`LogicSegment`], ready to be assigned to decoder channels.

use crate::runtime::segment::{Logic, LogicSegment, LogicSignal, Segment};
use crate::{CaptureError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use zip::ZipArchive;

/// Header information from a DSL file
#[derive(Debug, Clone)]
pub struct DslHeader {
    /// Total number of probes/channels
    pub total_probes: usize,
    /// Sample rate as a string (e.g., "50 MHz")
    pub samplerate: String,
    /// Sample rate in Hz
    pub samplerate_hz: f64,
    /// Sample period in seconds (1 / sample_rate)
    pub sample_period: f64,
    /// Total number of samples captured
    pub total_samples: u64,
    /// Total number of data blocks
    pub total_blocks: u64,
    /// Samples per block (size of the first block)
    pub samples_per_block: u64,
    /// Probe names indexed by probe number (0-based)
    pub probe_names: Vec<String>,
}

/// A DSLogic capture loaded into memory
pub struct DslCapture {
    header: DslHeader,
    segment: Arc<LogicSegment>,
}

impl DslCapture {
    /// Load a capture from a `.dsl` file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading capture {}", path.display());
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Load a capture from any seekable zip stream
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let header = Self::parse_header(&mut archive)?;
        let segment = Self::load_segment(&mut archive, &header)?;

        info!(
            "Loaded {} samples of {} probes at {}",
            header.total_samples, header.total_probes, header.samplerate
        );

        Ok(Self {
            header,
            segment: Arc::new(segment),
        })
    }

    fn parse_header<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<DslHeader> {
        let mut header_file = archive
            .by_name("header")
            .map_err(|e| CaptureError::ParseHeader(format!("Cannot find header file: {}", e)))?;

        let mut header_content = String::new();
        header_file.read_to_string(&mut header_content)?;
        drop(header_file);

        let mut total_probes: Option<usize> = None;
        let mut samplerate: Option<String> = None;
        let mut total_samples: Option<u64> = None;
        let mut total_blocks: Option<u64> = None;
        let mut probe_names_map: HashMap<usize, String> = HashMap::new();

        for line in header_content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(value) = line.strip_prefix("total probes = ") {
                total_probes = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("samplerate = ") {
                samplerate = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("total samples = ") {
                total_samples = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("total blocks = ") {
                total_blocks = value.parse().ok();
            } else if let Some((probe_part, name)) = line.split_once(" = ")
                && let Some(num_str) = probe_part.strip_prefix("probe")
                && let Ok(probe_num) = num_str.parse::<usize>()
            {
                probe_names_map.insert(probe_num, name.to_string());
            }
        }

        let total_probes =
            total_probes.ok_or_else(|| CaptureError::MissingField("total probes".to_string()))?;
        let samplerate =
            samplerate.ok_or_else(|| CaptureError::MissingField("samplerate".to_string()))?;
        let total_samples =
            total_samples.ok_or_else(|| CaptureError::MissingField("total samples".to_string()))?;
        let total_blocks =
            total_blocks.ok_or_else(|| CaptureError::MissingField("total blocks".to_string()))?;

        if total_probes == 0 {
            return Err(CaptureError::ParseHeader("Capture has no probes".to_string()));
        }

        let samplerate_hz = parse_sample_rate(&samplerate)
            .ok_or_else(|| CaptureError::ParseHeader(format!("Invalid sample rate: {}", samplerate)))?;

        // Blocks are fixed-size except the last one
        let samples_per_block = if total_blocks == 0 {
            0
        } else {
            let block = read_block(archive, 0, 0)?;
            (block.len() * 8) as u64
        };

        debug!(
            "File has {} samples across {} blocks ({} samples/block standard size)",
            total_samples, total_blocks, samples_per_block
        );

        let probe_names = (0..total_probes)
            .map(|i| {
                probe_names_map
                    .get(&i)
                    .cloned()
                    .unwrap_or_else(|| format!("Probe{}", i))
            })
            .collect();

        Ok(DslHeader {
            total_probes,
            samplerate,
            samplerate_hz,
            sample_period: 1.0 / samplerate_hz,
            total_samples,
            total_blocks,
            samples_per_block,
            probe_names,
        })
    }

    /// Interleave the per-probe bit streams into sample units
    fn load_segment<R: Read + Seek>(archive: &mut ZipArchive<R>, header: &DslHeader) -> Result<LogicSegment> {
        let unit_size = header.total_probes.div_ceil(8);
        let total_samples = header.total_samples as usize;
        let mut data = vec![0u8; total_samples * unit_size];

        for probe in 0..header.total_probes {
            let byte = probe / 8;
            let mask = 1u8 << (probe % 8);

            for block_num in 0..header.total_blocks {
                let block_start = (block_num * header.samples_per_block) as usize;
                if block_start >= total_samples {
                    break;
                }
                let block = read_block(archive, probe, block_num)?;
                let samples_in_block = (block.len() * 8).min(total_samples - block_start);

                for bit in 0..samples_in_block {
                    if get_bit(&block, bit) {
                        data[(block_start + bit) * unit_size + byte] |= mask;
                    }
                }
            }
            debug!("Loaded probe {} ({})", probe, header.probe_names[probe]);
        }

        LogicSegment::from_data(unit_size, header.samplerate_hz, data)
    }

    /// Get the header information
    pub fn header(&self) -> &DslHeader {
        &self.header
    }

    pub fn total_probes(&self) -> usize {
        self.header.total_probes
    }

    pub fn total_samples(&self) -> u64 {
        self.header.total_samples
    }

    pub fn samplerate_hz(&self) -> f64 {
        self.header.samplerate_hz
    }

    pub fn sample_period(&self) -> f64 {
        self.header.sample_period
    }

    /// Total capture duration in seconds
    pub fn capture_duration(&self) -> f64 {
        self.header.total_samples as f64 * self.header.sample_period
    }

    /// Read a single bit from a specific probe at a specific position
    pub fn read_bit(&self, probe: usize, position: u64) -> Result<bool> {
        if probe >= self.header.total_probes {
            return Err(CaptureError::InvalidProbe(probe));
        }
        if position >= self.segment.sample_count() {
            return Err(CaptureError::OutOfBounds(position));
        }
        let unit = self.segment.get_samples(position, position + 1);
        Ok(get_bit(&unit, probe))
    }

    /// The loaded samples
    pub fn segment(&self) -> &Arc<LogicSegment> {
        &self.segment
    }

    /// A logic source holding the capture and one signal per probe
    pub fn into_logic(self) -> (Arc<Logic>, Vec<LogicSignal>) {
        let logic = Arc::new(Logic::new(self.header.total_probes));
        logic.push_segment(self.segment);

        let signals = self
            .header
            .probe_names
            .into_iter()
            .enumerate()
            .map(|(index, name)| LogicSignal::new(name, index, Arc::clone(&logic)))
            .collect();

        (logic, signals)
    }
}

fn read_block<R: Read + Seek>(archive: &mut ZipArchive<R>, probe: usize, block_num: u64) -> Result<Vec<u8>> {
    let block_name = format!("L-{}/{}", probe, block_num);
    let mut file = archive
        .by_name(&block_name)
        .map_err(|_| CaptureError::InvalidBlock(block_num))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Extract a single bit from a byte array at the given bit index
#[inline]
fn get_bit(data: &[u8], bit_index: usize) -> bool {
    data.get(bit_index / 8)
        .is_some_and(|&byte| (byte >> (bit_index % 8)) & 1 == 1)
}

/// Parse a sample rate string (e.g., "50 MHz") into Hz
fn parse_sample_rate(samplerate: &str) -> Option<f64> {
    let parts: Vec<&str> = samplerate.split_whitespace().collect();
    if parts.len() >= 2
        && let Ok(value) = parts[0].parse::<f64>()
    {
        let multiplier = match parts[1] {
            "GHz" => 1_000_000_000.0,
            "MHz" => 1_000_000.0,
            "KHz" | "kHz" => 1_000.0,
            "Hz" => 1.0,
            _ => return None,
        };
        return Some(value * multiplier);
    }
    None
}
