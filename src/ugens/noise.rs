/// White noise in the open interval (-1, 1)
///
/// `Noise` draws a fresh value every tick. `SubNoise` holds each value for
/// `how_often` ticks (sample-and-hold noise, frequency given in samples).
/// A seed of 0 means "seed from entropy"; any other seed makes the sequence
/// reproducible, and `clear()` rewinds a seeded generator to its start.
use super::Generator;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct Noise {
    seed: u64,
    rng: StdRng,
    last: f32,
}

impl Noise {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: make_rng(seed),
            last: 0.0,
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = make_rng(seed);
    }

    pub fn last_out(&self) -> f32 {
        self.last
    }

    fn draw(&mut self) -> f32 {
        // gen_range excludes the upper bound; reject the lower one too
        loop {
            let v: f32 = self.rng.gen_range(-1.0..1.0);
            if v != -1.0 {
                return v;
            }
        }
    }
}

fn make_rng(seed: u64) -> StdRng {
    if seed == 0 {
        StdRng::from_entropy()
    } else {
        StdRng::seed_from_u64(seed)
    }
}

impl Generator for Noise {
    fn tick(&mut self) -> f32 {
        self.last = self.draw();
        self.last
    }

    fn clear(&mut self) {
        self.rng = make_rng(self.seed);
        self.last = 0.0;
    }
}

#[derive(Debug, Clone)]
pub struct SubNoise {
    noise: Noise,
    how_often: u32,
    counter: u32,
}

impl SubNoise {
    pub fn new(how_often: u32, seed: u64) -> Self {
        Self {
            noise: Noise::new(seed),
            how_often: how_often.max(1),
            counter: 0,
        }
    }

    /// Ticks per new value, at least 1
    pub fn set_how_often(&mut self, how_often: u32) {
        self.how_often = how_often.max(1);
    }

    pub fn last_out(&self) -> f32 {
        self.noise.last_out()
    }
}

impl Generator for SubNoise {
    fn tick(&mut self) -> f32 {
        if self.counter == 0 {
            self.noise.tick();
        }
        self.counter += 1;
        if self.counter >= self.how_often {
            self.counter = 0;
        }
        self.noise.last_out()
    }

    fn clear(&mut self) {
        self.noise.clear();
        self.counter = 0;
    }
}
