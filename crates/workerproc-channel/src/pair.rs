use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::process::Command;

use tracing::debug;

use crate::error::{ChannelError, Result};
use crate::stream::ChannelStream;

/// The well-known descriptor slot the protocol channel occupies in the
/// child, distinct from stdin (0), stdout (1), and stderr (2).
pub const WORKER_CHANNEL_FD: RawFd = 3;

/// A connected socketpair backing one parent-child protocol channel.
///
/// The parent keeps one end; the other is mapped onto
/// [`WORKER_CHANNEL_FD`] in the child at spawn time. Intended call order:
///
/// 1. [`ChannelPair::new`]
/// 2. [`ChannelPair::wire_command`] on the `Command` about to be spawned
/// 3. spawn the child
/// 4. [`ChannelPair::into_parent_end`], which closes the child end in the
///    parent
pub struct ChannelPair {
    parent: UnixStream,
    child: UnixStream,
}

impl ChannelPair {
    /// Create a fresh connected pair.
    pub fn new() -> Result<Self> {
        let (parent, child) = UnixStream::pair().map_err(ChannelError::Pair)?;
        debug!(
            parent_fd = parent.as_raw_fd(),
            child_fd = child.as_raw_fd(),
            "created channel pair"
        );
        Ok(Self { parent, child })
    }

    /// Arrange for the child end to appear on [`WORKER_CHANNEL_FD`] in the
    /// spawned process.
    ///
    /// The child end must stay alive (this pair not consumed) until the
    /// spawn call has returned.
    pub fn wire_command(&self, cmd: &mut Command) {
        let child_fd = self.child.as_raw_fd();
        // SAFETY: the closure runs between fork and exec and only calls
        // async-signal-safe libc functions (dup2/fcntl).
        unsafe {
            cmd.pre_exec(move || {
                if child_fd == WORKER_CHANNEL_FD {
                    // dup2 onto itself would keep CLOEXEC; clear it instead.
                    if libc::fcntl(child_fd, libc::F_SETFD, 0) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                } else if libc::dup2(child_fd, WORKER_CHANNEL_FD) < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    /// Keep the parent end, dropping (closing) the child end.
    ///
    /// Must be called after the spawn so the child has inherited its copy;
    /// leaving the child end open in the parent would suppress EOF when the
    /// child exits.
    pub fn into_parent_end(self) -> ChannelStream {
        drop(self.child);
        ChannelStream::from_unix(self.parent)
    }
}

/// Adopt the channel descriptor inherited from the parent (child side).
///
/// Validates that [`WORKER_CHANNEL_FD`] refers to a socket before taking
/// ownership; anything else means the process was not launched as a worker
/// child and the error says so.
pub fn adopt_worker_fd() -> Result<ChannelStream> {
    adopt_fd(WORKER_CHANNEL_FD)
}

/// Adopt an explicit descriptor as the channel (validated like
/// [`adopt_worker_fd`]). Takes ownership of the fd on success.
pub fn adopt_fd(fd: RawFd) -> Result<ChannelStream> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fstat writes into the provided stat buffer; fd validity is
    // exactly what is being checked.
    let rc = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(ChannelError::Stat {
            fd,
            source: std::io::Error::last_os_error(),
        });
    }
    // SAFETY: fstat returned 0, so the buffer is initialized.
    let stat = unsafe { stat.assume_init() };
    if stat.st_mode & libc::S_IFMT != libc::S_IFSOCK {
        return Err(ChannelError::NotASocket { fd });
    }

    debug!(fd, "adopted worker channel descriptor");
    // SAFETY: the descriptor was just validated as a socket; ownership is
    // transferred to the returned stream.
    let stream = unsafe { UnixStream::from_raw_fd(fd) };
    Ok(ChannelStream::from_unix(stream))
}
