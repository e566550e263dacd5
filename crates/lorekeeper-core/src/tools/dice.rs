//! Dice notation parsing and rolling.
//!
//! Accepts `NdM`, `NdM+K` and `NdM-K` (N defaults to 1), also when the
//! notation is embedded in a phrase such as "roll 1d20 for perception".

use std::sync::{LazyLock, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lorekeeper_types::error::ToolError;
use lorekeeper_types::tool::{Critical, DiceRoll};

pub const MAX_DICE: u32 = 100;
pub const MIN_SIDES: u32 = 2;
pub const MAX_SIDES: u32 = 1000;
const MAX_MODIFIER: i32 = 10_000;

static NOTATION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(\d*)d(\d+)(?:\s*([+-])\s*(\d+))?\b")
        .expect("dice notation pattern is valid")
});

/// A parsed, range-checked dice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiceSpec {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DiceSpec {
    pub fn parse(input: &str) -> Result<Self, ToolError> {
        let invalid = || ToolError::InvalidNotation(input.trim().to_string());
        let caps = NOTATION.captures(input.trim()).ok_or_else(invalid)?;

        let count = match &caps[1] {
            "" => 1,
            digits => digits.parse::<u32>().map_err(|_| invalid())?,
        };
        let sides = caps[2].parse::<u32>().map_err(|_| invalid())?;
        let modifier = match (caps.get(3), caps.get(4)) {
            (Some(sign), Some(value)) => {
                let value = value.as_str().parse::<i32>().map_err(|_| invalid())?;
                if sign.as_str() == "-" { -value } else { value }
            }
            _ => 0,
        };

        if !(1..=MAX_DICE).contains(&count)
            || !(MIN_SIDES..=MAX_SIDES).contains(&sides)
            || modifier.abs() > MAX_MODIFIER
        {
            return Err(invalid());
        }

        Ok(Self {
            count,
            sides,
            modifier,
        })
    }

    pub fn notation(&self) -> String {
        match self.modifier {
            0 => format!("{}d{}", self.count, self.sides),
            m if m > 0 => format!("{}d{}+{m}", self.count, self.sides),
            m => format!("{}d{}{m}", self.count, self.sides),
        }
    }

    pub fn roll<R: Rng + ?Sized>(&self, rng: &mut R) -> DiceRoll {
        let rolls: Vec<u32> = (0..self.count)
            .map(|_| rng.gen_range(1..=self.sides))
            .collect();
        let total = rolls.iter().map(|&r| i64::from(r)).sum::<i64>() + i64::from(self.modifier);

        let critical = match (self.count, self.sides, rolls.first()) {
            (1, 20, Some(20)) => Some(Critical::Success),
            (1, 20, Some(1)) => Some(Critical::Failure),
            _ => None,
        };

        DiceRoll {
            notation: self.notation(),
            count: self.count,
            sides: self.sides,
            modifier: self.modifier,
            rolls,
            total,
            critical,
        }
    }
}

/// Source of randomness for `roll_dice`; seedable for tests.
pub struct DiceRoller {
    rng: Mutex<StdRng>,
}

impl DiceRoller {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn roll(&self, notation: &str) -> Result<DiceRoll, ToolError> {
        let spec = DiceSpec::parse(notation)?;
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| ToolError::Upstream("dice roller poisoned".to_string()))?;
        Ok(spec.roll(&mut *rng))
    }
}

impl Default for DiceRoller {
    fn default() -> Self {
        Self::from_entropy()
    }
}
