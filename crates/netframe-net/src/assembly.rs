use netframe_wire::PacketProcessor;

use crate::Error;

/// Per-connection bookkeeping that tracks partial frames inside a
/// connection's arena slice. Offsets are slice-local: `0` is the start of
/// the slice, not the arena.
pub struct AssemblyCursor {
    header_size: usize,
    message_size: Option<usize>,
    data_start: usize,
    next_receive: usize,
}

impl AssemblyCursor {
    pub fn new(header_size: usize) -> Self {
        Self { header_size, message_size: None, data_start: 0, next_receive: 0 }
    }

    /// Where the next socket read should write into the slice.
    pub fn next_receive_offset(&self) -> usize {
        self.next_receive
    }

    pub fn record_received(&mut self, n: usize) {
        self.next_receive += n;
    }

    fn total_received(&self) -> usize {
        self.next_receive - self.data_start
    }

    /// Extracts every complete frame currently buffered in `slice`,
    /// invoking `on_frame` with each payload (header stripped) in arrival
    /// order, then compacts the slice if needed so the next read has room.
    pub fn extract_frames(
        &mut self,
        slice: &mut [u8],
        processor: &dyn PacketProcessor,
        mut on_frame: impl FnMut(&[u8]),
    ) -> Result<(), Error> {
        loop {
            if self.message_size.is_none() {
                if self.total_received() < self.header_size {
                    break;
                }
                let header = &slice[self.data_start..self.data_start + self.header_size];
                let msg_len = processor.message_len(header)?;
                let max_payload = slice.len() - self.header_size;
                if msg_len > max_payload {
                    return Err(Error::FrameTooLarge { declared: msg_len, max: max_payload });
                }
                self.message_size = Some(msg_len);
            }

            let msg_len = self.message_size.expect("checked above");
            if self.total_received() < self.header_size + msg_len {
                break;
            }

            let payload_start = self.data_start + self.header_size;
            on_frame(&slice[payload_start..payload_start + msg_len]);
            self.data_start = payload_start + msg_len;
            self.message_size = None;
        }

        self.compact(slice);
        Ok(())
    }

    fn compact(&mut self, slice: &mut [u8]) {
        let residual = self.next_receive - self.data_start;
        if residual == 0 {
            self.data_start = 0;
            self.next_receive = 0;
            return;
        }

        let next_needed = match self.message_size {
            Some(msg_len) => self.header_size + msg_len,
            None => self.header_size,
        };
        let still_needed = next_needed.saturating_sub(residual);
        let free_to_end = slice.len() - self.next_receive;
        if free_to_end < still_needed {
            slice.copy_within(self.data_start..self.next_receive, 0);
            self.data_start = 0;
            self.next_receive = residual;
        }
    }
}
