use crate::frame::{payload_mask, FrameHead, WsOpcode};
use rand::{thread_rng, RngCore};

#[derive(Copy, Clone, Debug)]
pub struct FrameEncoder {
    pub mask: bool,
}

impl FrameEncoder {
    pub fn client() -> Self {
        Self { mask: true }
    }
    pub fn server() -> Self {
        Self { mask: false }
    }
    /// Serializes one complete frame into a single buffer. A fresh random
    /// key is generated and the payload copy masked when this encoder
    /// masks; the input payload is left untouched.
    pub fn encode_vec(&self, opcode: WsOpcode, fin: bool, payload: &[u8]) -> Vec<u8> {
        let head = FrameHead {
            fin,
            rsv: 0,
            opcode,
            mask: match self.mask {
                true => Some(gen_mask_key()),
                false => None,
            },
            payload_len: payload.len() as u64,
        };
        let head_len = head.len_bytes();
        let mut buffer = vec![0u8; head_len + payload.len()];
        head.encode(&mut buffer[0..head_len]);
        buffer[head_len..].copy_from_slice(payload);
        if let Some(key) = head.mask {
            payload_mask(key, 0, &mut buffer[head_len..]);
        }
        buffer
    }
}

fn gen_mask_key() -> [u8; 4] {
    loop {
        let r = thread_rng().next_u32();
        if r != 0 {
            break r.to_ne_bytes();
        }
    }
}
