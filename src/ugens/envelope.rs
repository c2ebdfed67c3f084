/// Linear control envelopes
///
/// `Adsr` is the classic attack / decay / sustain / release generator driven
/// by `key_on` and `key_off`. Rates are per-sample increments of the value;
/// the `*_time` setters convert seconds into rates.
///
/// State machine:
/// - Attack: value rises by the attack rate until it reaches the target (1.0)
/// - Decay: value falls by the decay rate until it reaches the sustain level
/// - Sustain: value holds
/// - Release: value falls by the release rate until it reaches 0.0
/// - End: terminal, value held at 0.0 (reachable only through Release)
///
/// A fresh envelope sits idle in Sustain at 0.0 until it is keyed on.
use super::Envelope;
use crate::diagnostics::{non_negative, Corrected};

const SOURCE: &str = "ADSR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvState {
    Attack,
    Decay,
    Sustain,
    Release,
    End,
}

#[derive(Debug, Clone)]
pub struct Adsr {
    sample_rate: f32,
    value: f32,
    target: f32,
    rate: f32,
    attack_rate: f32,
    decay_rate: f32,
    sustain_level: f32,
    release_rate: f32,
    state: EnvState,
}

impl Adsr {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            value: 0.0,
            target: 0.0,
            rate: 0.0,
            attack_rate: 0.001,
            decay_rate: 0.001,
            sustain_level: 0.5,
            release_rate: 0.01,
            state: EnvState::Sustain,
        }
    }

    pub fn state(&self) -> EnvState {
        self.state
    }

    pub fn sustain_level(&self) -> f32 {
        self.sustain_level
    }

    pub fn set_attack_rate(&mut self, rate: f32) {
        self.attack_rate = non_negative("rates", rate).logged(SOURCE);
    }

    pub fn set_decay_rate(&mut self, rate: f32) {
        self.decay_rate = non_negative("rates", rate).logged(SOURCE);
    }

    pub fn set_release_rate(&mut self, rate: f32) {
        self.release_rate = non_negative("rates", rate).logged(SOURCE);
    }

    pub fn set_sustain_level(&mut self, level: f32) {
        self.sustain_level = sustain(level).logged(SOURCE);
    }

    pub fn set_attack_time(&mut self, seconds: f32) {
        self.attack_rate = self.time_to_rate(seconds);
    }

    pub fn set_decay_time(&mut self, seconds: f32) {
        self.decay_rate = self.time_to_rate(seconds);
    }

    pub fn set_release_time(&mut self, seconds: f32) {
        self.release_rate = self.time_to_rate(seconds);
    }

    pub fn set_all_times(&mut self, attack: f32, decay: f32, sustain_level: f32, release: f32) {
        self.set_attack_time(attack);
        self.set_decay_time(decay);
        self.set_sustain_level(sustain_level);
        self.set_release_time(release);
    }

    /// Glide toward `target` from the current value.
    ///
    /// Rising uses the attack rate, falling the decay rate; either way the
    /// target becomes the new sustain level.
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
        if self.value < target {
            self.state = EnvState::Attack;
            self.set_sustain_level(target);
            self.rate = self.attack_rate;
        }
        if self.value > target {
            self.set_sustain_level(target);
            self.state = EnvState::Decay;
            self.rate = self.decay_rate;
        }
    }

    /// Jump to `value` and hold it
    pub fn set_value(&mut self, value: f32) {
        self.state = EnvState::Sustain;
        self.target = value;
        self.value = value;
        self.set_sustain_level(value);
        self.rate = 0.0;
    }

    /// Advance one sample and return the new state
    pub fn inform_tick(&mut self) -> EnvState {
        Envelope::tick(self);
        self.state
    }

    fn time_to_rate(&self, seconds: f32) -> f32 {
        let seconds = non_negative("times", seconds).logged(SOURCE);
        if seconds == 0.0 {
            // instantaneous
            return f32::MAX;
        }
        (1.0 / self.sample_rate) / seconds
    }
}

fn sustain(level: f32) -> Corrected<f32> {
    if level < 0.0 {
        Corrected::fixed(0.0, "Sustain level out of range! Correcting...")
    } else {
        Corrected::ok(level)
    }
}

impl Envelope for Adsr {
    fn tick(&mut self) -> f32 {
        match self.state {
            EnvState::Attack => {
                self.value += self.rate;
                if self.value >= self.target {
                    self.value = self.target;
                    self.rate = self.decay_rate;
                    self.target = self.sustain_level;
                    self.state = EnvState::Decay;
                }
            }
            EnvState::Decay => {
                self.value -= self.decay_rate;
                if self.value <= self.sustain_level {
                    self.value = self.sustain_level;
                    self.rate = 0.0;
                    self.state = EnvState::Sustain;
                }
            }
            EnvState::Release => {
                self.value -= self.release_rate;
                if self.value <= 0.0 {
                    self.value = 0.0;
                    self.state = EnvState::End;
                }
            }
            EnvState::Sustain | EnvState::End => {}
        }
        self.value
    }

    fn key_on(&mut self) {
        if self.state == EnvState::End {
            return;
        }
        self.target = 1.0;
        self.rate = self.attack_rate;
        self.state = EnvState::Attack;
    }

    fn key_off(&mut self) {
        if self.state == EnvState::End {
            return;
        }
        self.target = 0.0;
        self.rate = self.release_rate;
        self.state = EnvState::Release;
    }

    /// Back to the idle state; rates and sustain level are kept
    fn clear(&mut self) {
        self.value = 0.0;
        self.target = 0.0;
        self.rate = 0.0;
        self.state = EnvState::Sustain;
    }

    fn value(&self) -> f32 {
        self.value
    }
}

/// Two-state ramp toward a target at a fixed rate
#[derive(Debug, Clone)]
pub struct LinearEnvelope {
    sample_rate: f32,
    value: f32,
    target: f32,
    rate: f32,
    /// True while the value is still moving
    active: bool,
}

impl LinearEnvelope {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            value: 0.0,
            target: 0.0,
            rate: 0.001,
            active: false,
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = non_negative("rates", rate).logged("Envelope");
    }

    /// Rate that covers a full-scale move in `seconds`
    pub fn set_time(&mut self, seconds: f32) {
        let seconds = non_negative("times", seconds).logged("Envelope");
        self.rate = if seconds == 0.0 {
            f32::MAX
        } else {
            (1.0 / self.sample_rate) / seconds
        };
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
        self.active = self.value != target;
    }

    pub fn set_value(&mut self, value: f32) {
        self.value = value;
        self.target = value;
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Envelope for LinearEnvelope {
    fn tick(&mut self) -> f32 {
        if self.active {
            if self.target > self.value {
                self.value += self.rate;
                if self.value >= self.target {
                    self.value = self.target;
                    self.active = false;
                }
            } else {
                self.value -= self.rate;
                if self.value <= self.target {
                    self.value = self.target;
                    self.active = false;
                }
            }
        }
        self.value
    }

    fn key_on(&mut self) {
        self.set_target(1.0);
    }

    fn key_off(&mut self) {
        self.set_target(0.0);
    }

    fn clear(&mut self) {
        self.value = 0.0;
        self.target = 0.0;
        self.active = false;
    }

    fn value(&self) -> f32 {
        self.value
    }
}
