//! Host audio backend seam.
//!
//! The backend owns the real output device (a WebAudio context, a cpal stream,
//! an offline bounce). The engine only asks it to start and stop pulling
//! blocks, and reads the device rate.

use crate::error::BackendError;

pub trait AudioBackend: Send {
    /// Ask the host to start (or resume) pulling audio.
    fn resume(&mut self) -> Result<(), BackendError>;
    fn suspend(&mut self);
    fn sample_rate(&self) -> u32;
}

/// Backend with no device: always starts, used for offline rendering and tests.
#[derive(Debug, Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    resumes: usize,
    running: bool,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        OfflineBackend {
            sample_rate,
            resumes: 0,
            running: false,
        }
    }

    /// Number of times `resume` has been called.
    pub fn resume_count(&self) -> usize {
        self.resumes
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl AudioBackend for OfflineBackend {
    fn resume(&mut self) -> Result<(), BackendError> {
        self.resumes += 1;
        self.running = true;
        Ok(())
    }

    fn suspend(&mut self) {
        self.running = false;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_backend_counts_resumes() {
        let mut backend = OfflineBackend::new(48000);
        assert!(!backend.is_running());
        backend.resume().unwrap();
        backend.resume().unwrap();
        assert_eq!(backend.resume_count(), 2);
        backend.suspend();
        assert!(!backend.is_running());
        assert_eq!(backend.sample_rate(), 48000);
    }
}
