/// Assembles printable ASCII bytes into `\n`/`\r`-terminated lines.
///
/// Non-printable bytes are dropped as line noise. A byte arriving at a full buffer clears it,
/// so a line spanning an overflow is lost rather than delivered truncated.
#[derive(Debug, Clone)]
pub struct LineAssembler {
    buffer: String,
    capacity: usize,
}

impl LineAssembler {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: String::with_capacity(capacity),
            capacity,
        }
    }

    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Returns a completed line when `byte` terminates a non-empty buffer.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\n' | b'\r' => {
                if self.buffer.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.buffer))
                }
            }
            32..=126 => {
                if self.buffer.len() < self.capacity {
                    self.buffer.push(byte as char);
                } else {
                    log::debug!("line buffer overflow, dropping {} bytes", self.buffer.len());
                    self.buffer.clear();
                }
                None
            }
            _ => None,
        }
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }
}
