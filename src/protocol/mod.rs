//! Scoreboard console wire protocol.
//!
//! The console pushes frames over a plain TCP stream, one frame per write:
//!
//! 1. **Prefix** (4 bytes) - SOH, address, STX, control byte
//! 2. **Body** - message tag and ASCII payload
//! 3. **Suffix** (2 bytes) - ETX, LRC checksum
//!
//! Only two handball messages are understood:
//!
//! | Tag | Message | Payload |
//! |---|---|---|
//! | `01?4` | game clock | status byte, `MM`, `SS`, period digit at body offset 10 |
//! | `024` | scores | two 3-character space-padded integers |
//!
//! Everything else decodes to [`DecodedMessage::Ignored`].

mod decoder;

pub use decoder::{
    DecodedMessage, FRAME_PREFIX_LEN, FRAME_SUFFIX_LEN, decode_frame, try_decode_frame,
};
