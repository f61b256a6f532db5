//! Channel id conventions.
//!
//! Channel 0 carries admin commands. Every other 16-bit id is a data channel.

/// Reserved id for admin/control traffic.
pub const ADMIN_CHANNEL: u16 = 0;

/// Returns true if `id` may carry data.
pub fn is_data_channel(id: u16) -> bool {
    id != ADMIN_CHANNEL
}
