//! Generate a room id.

use codesync_types::RoomId;

/// Run the new-room command.
pub fn run() {
    let room = RoomId::generate();
    tracing::debug!("Generated room {}", room);
    println!("{}", room);
}
