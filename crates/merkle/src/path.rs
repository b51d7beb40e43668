#[cfg(test)]
#[path = "tests/path.rs"]
mod tests;

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// One step down the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    const fn token(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PathError {
    #[error("unknown path token {0:?}")]
    UnknownToken(String),
}

/// Address of a subtree: a dotted `left`/`right` token string.
///
/// The empty string addresses the root.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TreePath(Vec<Direction>);

impl TreePath {
    /// The root path.
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Append one step, yielding the child path.
    #[must_use]
    pub fn child(&self, direction: Direction) -> Self {
        let mut steps = self.0.clone();
        steps.push(direction);
        Self(steps)
    }

    pub fn steps(&self) -> impl Iterator<Item = Direction> + '_ {
        self.0.iter().copied()
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }

        let mut steps = Vec::new();
        for token in s.split('.') {
            match token {
                "left" => steps.push(Direction::Left),
                "right" => steps.push(Direction::Right),
                other => return Err(PathError::UnknownToken(other.to_owned())),
            }
        }

        Ok(Self(steps))
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(step.token())?;
        }
        Ok(())
    }
}
