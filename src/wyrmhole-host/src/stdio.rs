use crate::main_loop::LoopHandle;
use std::io::Read;
use std::thread::{self, JoinHandle};
use wyrmhole_protocol::FrameReader;

/// Feed every frame from `reader` into the loop until EOF or a read error,
/// then ask the loop to exit. Returns the number of frames read.
pub fn pump_frames<R: Read>(mut reader: FrameReader<R>, handle: &LoopHandle) -> u64 {
    let mut frames = 0u64;
    loop {
        match reader.read_frame() {
            Ok(Some(text)) => {
                frames += 1;
                handle.message_in(&text);
            }
            Ok(None) => {
                tracing::info!(frames, "extension closed the channel");
                break;
            }
            Err(err) => {
                tracing::error!(frames, error = %err, "failed to read from extension");
                break;
            }
        }
    }
    handle.request_exit();
    frames
}

/// Start the thread that reads stdin for the lifetime of the host.
pub fn spawn_stdin_reader(
    handle: LoopHandle,
    max_frame_bytes: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("wyrmhole-stdin".into())
        .spawn(move || {
            let reader = FrameReader::new(std::io::stdin().lock(), max_frame_bytes);
            pump_frames(reader, &handle);
        })
}
