use humansize::{format_size, DECIMAL};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub fn human_size(nbytes: u64) -> String {
    format_size(nbytes, DECIMAL)
}

/// `"{:.2} MB"` with binary megabytes, as reported to the web client.
pub fn format_mb(nbytes: i64) -> String {
    format!("{:.2} MB", nbytes as f64 / BYTES_PER_MB)
}

/// Before/after sizes of one compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeStats {
    pub original: u64,
    pub compressed: u64,
}

impl SizeStats {
    pub fn new(original: u64, compressed: u64) -> Self {
        Self { original, compressed }
    }

    /// Negative when the output grew.
    pub fn saved_bytes(&self) -> i64 {
        self.original as i64 - self.compressed as i64
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.original as f64 * 100.0
    }

    pub fn reduction(&self) -> String {
        format!("{:.2}", self.reduction_percent())
    }

    pub fn original_size(&self) -> String {
        format_mb(self.original as i64)
    }

    pub fn compressed_size(&self) -> String {
        format_mb(self.compressed as i64)
    }

    pub fn saved(&self) -> String {
        format_mb(self.saved_bytes())
    }
}
