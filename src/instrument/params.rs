//! Positional instrument parameters and their documented defaults

use crate::dispatch::Arg;
use crate::error::{EngineError, Result};
use crate::pfield::Handle;

/// One positional parameter: a number or a time-varying field
#[derive(Debug, Clone)]
pub enum ParamValue {
    Float(f64),
    Field(Handle),
}

impl ParamValue {
    /// The number, or the field's value at its start
    pub fn initial(&self) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Field(h) => h.value_at(0),
        }
    }

    /// Value `fraction` of the way through the note
    pub fn at_fraction(&self, fraction: f64) -> f64 {
        match self {
            ParamValue::Float(v) => *v,
            ParamValue::Field(h) => h.value_at_fraction(fraction),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Params {
    values: Vec<ParamValue>,
}

impl Params {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    pub fn from_floats(values: &[f64]) -> Self {
        Self::new(values.iter().map(|&v| ParamValue::Float(v)).collect())
    }

    /// Instrument parameters from dispatch arguments; only floats and
    /// handles are allowed
    pub fn from_args(func: &str, args: &[Arg]) -> Result<Self> {
        args.iter()
            .enumerate()
            .map(|(i, arg)| match arg {
                Arg::Float(v) => Ok(ParamValue::Float(*v)),
                Arg::Handle(h) => Ok(ParamValue::Field(h.clone())),
                _ => Err(EngineError::ArgumentType {
                    func: func.to_owned(),
                    arg: i,
                    expected: "float or handle",
                }),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Initial value of parameter `i`; 0.0 past the end
    pub fn get(&self, i: usize) -> f64 {
        self.values.get(i).map_or(0.0, ParamValue::initial)
    }

    pub fn value(&self, i: usize) -> Option<&ParamValue> {
        self.values.get(i)
    }

    /// Parameter `i` if it is a field
    pub fn field(&self, i: usize) -> Option<&Handle> {
        match self.values.get(i) {
            Some(ParamValue::Field(h)) => Some(h),
            _ => None,
        }
    }

    pub fn is_field(&self, i: usize) -> bool {
        self.field(i).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParamValue> {
        self.values.iter()
    }
}

/// Declared parameter count: the first `required` are mandatory, the rest
/// take `defaults` when absent
#[derive(Debug, Clone, PartialEq)]
pub struct ParamLayout {
    pub required: usize,
    pub defaults: Vec<f64>,
}

impl ParamLayout {
    pub fn new(required: usize, defaults: &[f64]) -> Self {
        Self {
            required,
            defaults: defaults.to_vec(),
        }
    }

    /// Full declared length
    pub fn total(&self) -> usize {
        self.required + self.defaults.len()
    }

    /// Default for position `i`, if it has one
    pub fn default_for(&self, i: usize) -> Option<f64> {
        i.checked_sub(self.required).and_then(|k| self.defaults.get(k).copied())
    }

    /// Complete `given` with defaults for the missing trailing parameters.
    ///
    /// Extra parameters beyond the declared count are kept.
    pub fn fill(&self, who: &str, given: &Params) -> Result<Params> {
        if given.len() < self.required {
            return Err(EngineError::MissingParameters {
                who: who.to_owned(),
                given: given.len(),
                required: self.required,
            });
        }
        let mut values: Vec<ParamValue> = given.iter().cloned().collect();
        for i in given.len()..self.total() {
            if let Some(default) = self.default_for(i) {
                values.push(ParamValue::Float(default));
            }
        }
        Ok(Params::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pfield::PField;

    #[test]
    fn test_fill_appends_defaults() {
        let layout = ParamLayout::new(3, &[1.0, 0.5]);
        let filled = layout.fill("TEST", &Params::from_floats(&[0.0, 1.0, 440.0])).unwrap();
        assert_eq!(filled.len(), 5);
        assert_eq!(filled.get(3), 1.0);
        assert_eq!(filled.get(4), 0.5);

        let partial = layout.fill("TEST", &Params::from_floats(&[0.0, 1.0, 440.0, 0.2])).unwrap();
        assert_eq!(partial.get(3), 0.2);
        assert_eq!(partial.get(4), 0.5);
    }

    #[test]
    fn test_too_few_is_fatal() {
        let layout = ParamLayout::new(3, &[]);
        let err = layout.fill("TEST", &Params::from_floats(&[0.0])).unwrap_err();
        assert!(matches!(err, EngineError::MissingParameters { given: 1, required: 3, .. }));
    }

    #[test]
    fn test_from_args_accepts_handles_only_besides_floats() {
        let handle = PField::constant(0.25);
        let params = Params::from_args("TEST", &[Arg::Float(1.0), Arg::Handle(handle)]).unwrap();
        assert!(params.is_field(1));
        assert_eq!(params.get(1), 0.25);

        assert!(Params::from_args("TEST", &[Arg::Str("x".into())]).is_err());
    }
}
