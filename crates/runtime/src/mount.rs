use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generation counter guarding async results against teardown races.
///
/// A component takes a [`MountToken`] before awaiting; once the await
/// resolves it applies the result only if the token is still current.
/// Unmounting (or remounting with new ids) bumps the generation, so late
/// results are discarded instead of mutating a map that no longer owns
/// the component's layers.
#[derive(Debug, Clone, Default)]
pub struct MountGuard {
    generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone)]
pub struct MountToken {
    generation: Arc<AtomicU64>,
    taken_at: u64,
}

impl MountGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> MountToken {
        MountToken {
            generation: self.generation.clone(),
            taken_at: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Invalidates every outstanding token.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl MountToken {
    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.taken_at
    }
}

#[cfg(test)]
mod tests {
    use super::MountGuard;

    #[test]
    fn invalidate_expires_outstanding_tokens() {
        let guard = MountGuard::new();
        let before = guard.token();
        assert!(before.is_current());

        guard.invalidate();
        assert!(!before.is_current());

        let after = guard.token();
        assert!(after.is_current());
        assert_eq!(guard.generation(), 1);
    }
}
