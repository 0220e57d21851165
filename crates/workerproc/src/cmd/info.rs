use workerproc_channel::WORKER_CHANNEL_FD;
use workerproc_frame::{HANDSHAKE_CHILD, HANDSHAKE_PARENT, MAX_FRAME_LEN, PREFIX_SIZE};
use workerproc_peer::{DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_DURATION, EXIT_GRACE};

use crate::cmd::InfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_kv, OutputFormat};

pub fn run(_args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let rows = [
        ("channel_fd", WORKER_CHANNEL_FD.to_string()),
        ("prefix_size", PREFIX_SIZE.to_string()),
        ("max_frame_len", MAX_FRAME_LEN.to_string()),
        ("handshake_parent", format!("0x{HANDSHAKE_PARENT:02x}")),
        ("handshake_child", format!("0x{HANDSHAKE_CHILD:02x}")),
        (
            "default_handshake_timeout",
            format!("{DEFAULT_HANDSHAKE_TIMEOUT:?}"),
        ),
        ("default_max_duration", format!("{DEFAULT_MAX_DURATION:?}")),
        ("exit_grace", format!("{EXIT_GRACE:?}")),
    ];
    print_kv(&rows, format);
    Ok(SUCCESS)
}
