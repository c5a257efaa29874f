// Masks or unmasks a buffer of payload bytes in place. The offset is the
// position of the buffer within the frame's payload segment, so chunked
// processing lines up with the rotating key. Any multiple of 4 may be added
// to or subtracted from the offset without changing the result.
pub fn payload_mask(mask: [u8; 4], mut offset: usize, buffer: &mut [u8]) {
    for byte in buffer.iter_mut() {
        *byte ^= mask[offset & 3];
        offset = offset.wrapping_add(1);
    }
}
