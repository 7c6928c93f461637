//! Decoder metadata and decoder stack entries

use crate::runtime::engine::{EngineSession, InstanceConfig, InstanceId, OptionValue};
use crate::runtime::errors::EngineError;
use crate::runtime::segment::LogicSignal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A channel a decoder reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub desc: String,
}

impl ChannelSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            desc: desc.into(),
        }
    }
}

/// An annotation class; its position in `DecoderInfo::annotations` is its id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationClass {
    pub id: String,
    pub desc: String,
}

/// A display row declared by a decoder, grouping one or more classes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRowDesc {
    pub id: String,
    pub desc: String,
    /// Class ids shown in this row
    pub classes: Vec<u32>,
}

/// Static description of a protocol decoder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecoderInfo {
    pub id: String,
    pub name: String,
    pub longname: String,
    pub channels: Vec<ChannelSpec>,
    pub optional_channels: Vec<ChannelSpec>,
    pub annotations: Vec<AnnotationClass>,
    pub annotation_rows: Vec<AnnotationRowDesc>,
}

impl DecoderInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            longname: name.clone(),
            name,
            ..Default::default()
        }
    }

    pub fn with_longname(mut self, longname: impl Into<String>) -> Self {
        self.longname = longname.into();
        self
    }

    /// Add a required channel
    pub fn with_channel(mut self, id: &str, name: &str, desc: &str) -> Self {
        self.channels.push(ChannelSpec::new(id, name, desc));
        self
    }

    pub fn with_optional_channel(mut self, id: &str, name: &str, desc: &str) -> Self {
        self.optional_channels.push(ChannelSpec::new(id, name, desc));
        self
    }

    /// Add an annotation class; classes are numbered in declaration order
    pub fn with_annotation(mut self, id: &str, desc: &str) -> Self {
        self.annotations.push(AnnotationClass {
            id: id.to_string(),
            desc: desc.to_string(),
        });
        self
    }

    pub fn with_annotation_row(mut self, id: &str, desc: &str, classes: &[u32]) -> Self {
        self.annotation_rows.push(AnnotationRowDesc {
            id: id.to_string(),
            desc: desc.to_string(),
            classes: classes.to_vec(),
        });
        self
    }

    /// Required channels first, then optional ones, each in declaration order
    pub fn all_channels(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter().chain(self.optional_channels.iter())
    }
}

/// One entry of a decoder stack: a decoder plus its configuration
#[derive(Debug, Clone)]
pub struct Decoder {
    info: Arc<DecoderInfo>,
    channels: BTreeMap<String, LogicSignal>,
    options: BTreeMap<String, OptionValue>,
    shown: bool,
}

impl Decoder {
    pub fn new(info: Arc<DecoderInfo>) -> Self {
        Self {
            info,
            channels: BTreeMap::new(),
            options: BTreeMap::new(),
            shown: true,
        }
    }

    /// Assign a logic signal to a decoder channel (builder pattern)
    pub fn with_channel(mut self, id: impl Into<String>, signal: LogicSignal) -> Self {
        self.set_channel(id, signal);
        self
    }

    pub fn with_option(mut self, id: impl Into<String>, value: impl Into<OptionValue>) -> Self {
        self.set_option(id, value);
        self
    }

    pub fn info(&self) -> &Arc<DecoderInfo> {
        &self.info
    }

    pub fn set_channel(&mut self, id: impl Into<String>, signal: LogicSignal) {
        self.channels.insert(id.into(), signal);
    }

    pub fn unset_channel(&mut self, id: &str) -> Option<LogicSignal> {
        self.channels.remove(id)
    }

    pub fn channel(&self, id: &str) -> Option<&LogicSignal> {
        self.channels.get(id)
    }

    pub fn set_option(&mut self, id: impl Into<String>, value: impl Into<OptionValue>) {
        self.options.insert(id.into(), value.into());
    }

    pub fn options(&self) -> &BTreeMap<String, OptionValue> {
        &self.options
    }

    pub fn shown(&self) -> bool {
        self.shown
    }

    pub fn show(&mut self, shown: bool) {
        self.shown = shown;
    }

    /// Whether every required channel has a signal assigned
    pub fn have_required_channels(&self) -> bool {
        self.info
            .channels
            .iter()
            .all(|spec| self.channels.contains_key(&spec.id))
    }

    /// The first assigned signal in channel declaration order
    pub fn first_assigned_signal(&self) -> Option<&LogicSignal> {
        self.info
            .all_channels()
            .find_map(|spec| self.channels.get(&spec.id))
    }

    /// Engine-facing configuration of this entry
    pub fn instance_config(&self) -> InstanceConfig {
        InstanceConfig {
            decoder: self.info.id.clone(),
            channels: self
                .channels
                .iter()
                .map(|(id, signal)| (id.clone(), signal.index()))
                .collect(),
            options: self.options.clone(),
        }
    }

    /// Instantiate this decoder inside an engine session
    pub fn create_instance(&self, session: &mut dyn EngineSession) -> Result<InstanceId, EngineError> {
        session.create_instance(&self.instance_config())
    }
}
