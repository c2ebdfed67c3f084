//! `bus_config` declarations
//!
//! Spec strings name a bank, a bus or inclusive range, and for AUX a
//! direction:
//!
//! ```text
//! in 0-1        read IN buses 0 and 1
//! aux 2 in      read AUX bus 2
//! aux 0-1 out   write AUX buses 0 and 1
//! out 0-1       write OUT buses 0 and 1
//! ```

use super::{BusKind, MAX_BUS};
use crate::error::{EngineError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

lazy_static! {
    static ref BUS_SPEC: Regex =
        Regex::new(r"^(in|out|aux)\s*(\d+)(?:\s*-\s*(\d+))?\s*(in|out)?$").expect("valid bus spec regex");
}

/// One parsed spec string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusSpec {
    In(Vec<usize>),
    AuxIn(Vec<usize>),
    AuxOut(Vec<usize>),
    Out(Vec<usize>),
}

pub fn parse_bus_spec(spec: &str) -> Result<BusSpec> {
    let text = spec.trim().to_ascii_lowercase();
    let caps = BUS_SPEC
        .captures(&text)
        .ok_or_else(|| EngineError::BusConfig(format!("malformed bus spec \"{}\"", spec)))?;

    let number = |i: usize| -> Result<Option<usize>> {
        match caps.get(i) {
            None => Ok(None),
            Some(m) => m
                .as_str()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| EngineError::BusConfig(format!("bad bus number in \"{}\"", spec))),
        }
    };
    let first = number(2)?.unwrap_or(0);
    let last = number(3)?.unwrap_or(first);
    if last < first {
        return Err(EngineError::BusConfig(format!("reversed bus range in \"{}\"", spec)));
    }
    if last >= MAX_BUS {
        return Err(EngineError::BusConfig(format!(
            "bus {} out of range in \"{}\" (max is {})",
            last,
            spec,
            MAX_BUS - 1
        )));
    }
    let buses: Vec<usize> = (first..=last).collect();

    let direction = caps.get(4).map(|m| m.as_str());
    match (&caps[1], direction) {
        ("in", None) => Ok(BusSpec::In(buses)),
        ("out", None) => Ok(BusSpec::Out(buses)),
        ("aux", Some("in")) => Ok(BusSpec::AuxIn(buses)),
        ("aux", Some("out")) => Ok(BusSpec::AuxOut(buses)),
        ("aux", None) => Err(EngineError::BusConfig(format!(
            "aux bus spec \"{}\" needs \"in\" or \"out\"",
            spec
        ))),
        _ => Err(EngineError::BusConfig(format!("malformed bus spec \"{}\"", spec))),
    }
}

/// Where an instrument's input comes from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BusInput {
    #[default]
    None,
    In(Vec<usize>),
    Aux(Vec<usize>),
}

/// The complete bus binding for one instrument name
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BusSlot {
    pub input: BusInput,
    pub aux_out: Vec<usize>,
    pub out: Vec<usize>,
}

impl BusSlot {
    /// `in 0`, `out 0-(output_channels-1)`
    pub fn default_for(output_channels: usize) -> Self {
        Self {
            input: BusInput::In(vec![0]),
            aux_out: Vec::new(),
            out: (0..output_channels.clamp(1, MAX_BUS)).collect(),
        }
    }

    /// Combine spec strings into a slot
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> Result<Self> {
        let mut slot = BusSlot::default();
        for spec in specs {
            match parse_bus_spec(spec.as_ref())? {
                BusSpec::In(buses) => {
                    if matches!(slot.input, BusInput::Aux(_)) {
                        return Err(EngineError::BusConfig(
                            "can't have both in and aux-in buses in one bus_config".into(),
                        ));
                    }
                    slot.input = BusInput::In(buses);
                }
                BusSpec::AuxIn(buses) => {
                    if matches!(slot.input, BusInput::In(_)) {
                        return Err(EngineError::BusConfig(
                            "can't have both in and aux-in buses in one bus_config".into(),
                        ));
                    }
                    slot.input = BusInput::Aux(buses);
                }
                BusSpec::AuxOut(buses) => slot.aux_out = buses,
                BusSpec::Out(buses) => slot.out = buses,
            }
        }
        if slot.aux_out.is_empty() && slot.out.is_empty() {
            return Err(EngineError::BusConfig("bus_config needs at least one output".into()));
        }
        if !slot.aux_out.is_empty() && !slot.out.is_empty() && slot.aux_out.len() != slot.out.len() {
            return Err(EngineError::BusConfig(format!(
                "aux out ({} buses) and out ({} buses) must have the same width",
                slot.aux_out.len(),
                slot.out.len()
            )));
        }
        Ok(slot)
    }

    pub fn input_channels(&self) -> usize {
        match &self.input {
            BusInput::None => 0,
            BusInput::In(buses) | BusInput::Aux(buses) => buses.len(),
        }
    }

    /// Channels the instrument writes; each goes to its aux and/or out bus
    pub fn output_channels(&self) -> usize {
        self.aux_out.len().max(self.out.len())
    }

    pub fn aux_inputs(&self) -> &[usize] {
        match &self.input {
            BusInput::Aux(buses) => buses,
            _ => &[],
        }
    }

    /// Human-readable form, as it would be written in a bus_config call
    pub fn describe(&self) -> String {
        let range = |buses: &[usize]| match buses {
            [] => String::new(),
            [one] => one.to_string(),
            [first, .., last] => format!("{}-{}", first, last),
        };
        let mut parts = Vec::new();
        match &self.input {
            BusInput::None => {}
            BusInput::In(b) => parts.push(format!("in {}", range(b))),
            BusInput::Aux(b) => parts.push(format!("aux {} in", range(b))),
        }
        if !self.aux_out.is_empty() {
            parts.push(format!("aux {} out", range(&self.aux_out)));
        }
        if !self.out.is_empty() {
            parts.push(format!("out {}", range(&self.out)));
        }
        parts.join(", ")
    }
}

/// Bus bindings by instrument name
#[derive(Debug)]
pub struct BusConfigRegistry {
    slots: Mutex<HashMap<String, Arc<BusSlot>>>,
    default_slot: Arc<BusSlot>,
    /// Bumped on every change so play-lists know to rebuild
    generation: Mutex<u64>,
}

impl BusConfigRegistry {
    pub fn new(output_channels: usize) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            default_slot: Arc::new(BusSlot::default_for(output_channels)),
            generation: Mutex::new(0),
        }
    }

    /// Bind `inst_name` to the buses described by `specs`
    pub fn configure<S: AsRef<str>>(&self, inst_name: &str, specs: &[S]) -> Result<Arc<BusSlot>> {
        let slot = Arc::new(BusSlot::from_specs(specs)?);
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(inst_name.to_owned(), Arc::clone(&slot));
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(slot)
    }

    /// The binding for `inst_name`, or the default one
    pub fn slot_for(&self, inst_name: &str) -> Arc<BusSlot> {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(inst_name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_slot))
    }

    pub fn is_configured(&self, inst_name: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(inst_name)
    }

    /// Every explicit binding
    pub fn slots(&self) -> Vec<(String, Arc<BusSlot>)> {
        let mut slots: Vec<(String, Arc<BusSlot>)> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, slot)| (name.clone(), Arc::clone(slot)))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).clear();
        *self.generation.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_specs() {
        assert_eq!(parse_bus_spec("in 0-1").unwrap(), BusSpec::In(vec![0, 1]));
        assert_eq!(parse_bus_spec("aux 2 in").unwrap(), BusSpec::AuxIn(vec![2]));
        assert_eq!(parse_bus_spec("aux 0-1 out").unwrap(), BusSpec::AuxOut(vec![0, 1]));
        assert_eq!(parse_bus_spec("out 0-1").unwrap(), BusSpec::Out(vec![0, 1]));
        assert_eq!(parse_bus_spec("  OUT 3 ").unwrap(), BusSpec::Out(vec![3]));
        assert_eq!(parse_bus_spec("aux4-5out").unwrap(), BusSpec::AuxOut(vec![4, 5]));
    }

    #[test]
    fn test_bad_specs_are_fatal() {
        for bad in ["out 32", "in 0-40", "aux 1", "sideways 0", "out 3-1", "out", ""] {
            assert!(
                matches!(parse_bus_spec(bad), Err(EngineError::BusConfig(_))),
                "\"{}\" should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_in_and_aux_in_are_exclusive() {
        assert!(BusSlot::from_specs(&["in 0", "aux 1 in", "out 0"]).is_err());
    }

    #[test]
    fn test_slot_channel_counts() {
        let slot = BusSlot::from_specs(&["aux 0-1 in", "out 0-1"]).unwrap();
        assert_eq!(slot.input_channels(), 2);
        assert_eq!(slot.output_channels(), 2);
        assert_eq!(slot.aux_inputs(), &[0, 1]);
        assert_eq!(slot.describe(), "aux 0-1 in, out 0-1");
    }

    #[test]
    fn test_registry_falls_back_to_default() {
        let registry = BusConfigRegistry::new(2);
        let slot = registry.slot_for("WAVETABLE");
        assert_eq!(slot.input, BusInput::In(vec![0]));
        assert_eq!(slot.out, vec![0, 1]);

        let before = registry.generation();
        registry.configure("WAVETABLE", &["aux 3 out"]).unwrap();
        assert!(registry.generation() > before);
        assert_eq!(registry.slot_for("WAVETABLE").aux_out, vec![3]);
        assert!(!registry.is_configured("MIX"));
    }
}
