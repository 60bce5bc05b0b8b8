//! Host-level named queue backed by POSIX message queues.
//!
//! Any process on the host that opens the same name shares the queue. The OS
//! object outlives every handle: [`PosixMessageQueue::close`] only releases the
//! local descriptor, and whoever owns the queue's lifecycle must call
//! [`PosixMessageQueue::unlink`] explicitly.

use std::os::fd::AsRawFd;
use std::time::Duration;

use nix::errno::Errno;
use nix::mqueue::{mq_close, mq_getattr, mq_open, mq_unlink, MQ_OFlag, MqAttr, MqdT};
use nix::sys::stat::Mode;

use crate::wait::Deadline;
use crate::{MessageQueue, QueueError, QueueResult};

/// Longest name accepted by `mq_open`, excluding the leading separator.
const NAME_MAX: usize = 255;

/// Named, host-visible bounded queue.
pub struct PosixMessageQueue {
    name: String,
    mqd: Option<MqdT>,
    max_messages: usize,
    max_message_size: usize,
}

impl PosixMessageQueue {
    /// Opens `name`, creating it with the given bounds if it does not exist.
    ///
    /// When the queue already exists its original attributes are kept; the
    /// effective values are reported by [`Self::max_messages`] and
    /// [`Self::max_message_size`].
    pub fn open(name: &str, max_messages: usize, max_message_size: usize) -> QueueResult<Self> {
        validate_name(name)?;
        if max_messages == 0 || max_message_size == 0 {
            return Err(QueueError::InvalidConfig(
                "posix queue bounds must be non-zero",
            ));
        }

        let attr = MqAttr::new(0, max_messages as _, max_message_size as _, 0);
        let mqd = mq_open(
            name,
            MQ_OFlag::O_CREAT | MQ_OFlag::O_RDWR,
            Mode::S_IRUSR | Mode::S_IWUSR,
            Some(&attr),
        )
        .map_err(|errno| QueueError::resource(name, errno))?;

        let actual = match mq_getattr(&mqd) {
            Ok(actual) => actual,
            Err(errno) => {
                let _ = mq_close(mqd);
                return Err(QueueError::resource(name, errno));
            }
        };

        tracing::debug!(
            queue = name,
            max_messages = actual.maxmsg(),
            max_message_size = actual.msgsize(),
            "opened posix message queue"
        );

        Ok(Self {
            name: name.to_owned(),
            mqd: Some(mqd),
            max_messages: actual.maxmsg() as usize,
            max_message_size: actual.msgsize() as usize,
        })
    }

    /// Removes `name` from the host namespace. Open handles keep working until
    /// they are closed; new opens create a fresh queue.
    pub fn unlink(name: &str) -> QueueResult<()> {
        validate_name(name)?;
        mq_unlink(name).map_err(|errno| QueueError::resource(name, errno))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Messages currently buffered in the OS queue.
    pub fn current_messages(&self) -> QueueResult<usize> {
        let mqd = self.descriptor()?;
        let attr = mq_getattr(mqd).map_err(|errno| QueueError::resource(&self.name, errno))?;
        Ok(attr.curmsgs() as usize)
    }

    /// Enqueues `message`, waiting up to `timeout` for free capacity.
    pub fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        if message.len() > self.max_message_size {
            return Err(QueueError::MessageTooLarge {
                size: message.len(),
                max: self.max_message_size,
            });
        }
        let fd = self.descriptor()?.as_raw_fd();
        let deadline = Deadline::after(timeout);

        loop {
            let rc = match deadline.wall_clock() {
                None => {
                    // SAFETY: `fd` is an open message queue descriptor owned by
                    // `self`, and `message` outlives the call.
                    unsafe { libc::mq_send(fd, message.as_ptr().cast(), message.len(), 0) }
                }
                Some(at) => {
                    let abs = timespec(at);
                    // SAFETY: as above; `abs` is a valid timespec on the stack.
                    unsafe {
                        libc::mq_timedsend(fd, message.as_ptr().cast(), message.len(), 0, &abs)
                    }
                }
            };
            if rc == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(self.map_errno(errno, message.len())),
            }
        }
    }

    /// Dequeues the oldest message, waiting up to `timeout` for one to arrive.
    pub fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        let fd = self.descriptor()?.as_raw_fd();
        let deadline = Deadline::after(timeout);
        let mut buf = vec![0u8; self.max_message_size];

        loop {
            let mut priority = 0u32;
            let received = match deadline.wall_clock() {
                None => {
                    // SAFETY: `buf` is writable for `buf.len()` bytes, which is the
                    // queue's message size as reported by `mq_getattr`.
                    unsafe {
                        libc::mq_receive(fd, buf.as_mut_ptr().cast(), buf.len(), &mut priority)
                    }
                }
                Some(at) => {
                    let abs = timespec(at);
                    // SAFETY: as above; `abs` is a valid timespec on the stack.
                    unsafe {
                        libc::mq_timedreceive(
                            fd,
                            buf.as_mut_ptr().cast(),
                            buf.len(),
                            &mut priority,
                            &abs,
                        )
                    }
                }
            };
            if received >= 0 {
                buf.truncate(received as usize);
                return Ok(buf);
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(self.map_errno(errno, 0)),
            }
        }
    }

    fn descriptor(&self) -> QueueResult<&MqdT> {
        self.mqd.as_ref().ok_or(QueueError::Closed)
    }

    fn map_errno(&self, errno: Errno, size: usize) -> QueueError {
        match errno {
            Errno::ETIMEDOUT | Errno::EAGAIN => QueueError::TimedOut,
            Errno::EMSGSIZE => QueueError::MessageTooLarge {
                size,
                max: self.max_message_size,
            },
            Errno::EBADF => QueueError::Closed,
            other => QueueError::resource(&self.name, other),
        }
    }
}

impl MessageQueue for PosixMessageQueue {
    fn put(&self, message: &[u8], timeout: Option<Duration>) -> QueueResult<()> {
        PosixMessageQueue::put(self, message, timeout)
    }

    fn get(&self, timeout: Option<Duration>) -> QueueResult<Vec<u8>> {
        PosixMessageQueue::get(self, timeout)
    }

    fn close(&mut self) -> QueueResult<()> {
        match self.mqd.take() {
            Some(mqd) => mq_close(mqd).map_err(|errno| QueueError::resource(&self.name, errno)),
            None => Ok(()),
        }
    }
}

impl Drop for PosixMessageQueue {
    fn drop(&mut self) {
        if let Some(mqd) = self.mqd.take() {
            if let Err(errno) = mq_close(mqd) {
                tracing::warn!(queue = %self.name, %errno, "failed to close posix message queue");
            }
        }
    }
}

fn validate_name(name: &str) -> QueueResult<()> {
    let Some(rest) = name.strip_prefix('/') else {
        return Err(QueueError::resource(
            name,
            "queue name must start with '/'",
        ));
    };
    if rest.is_empty() || rest.contains('/') {
        return Err(QueueError::resource(
            name,
            "queue name must be a single non-empty path component",
        ));
    }
    if rest.len() > NAME_MAX {
        return Err(QueueError::resource(name, "queue name is too long"));
    }
    Ok(())
}

fn timespec(at: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: at.as_secs() as libc::time_t,
        tv_nsec: at.subsec_nanos() as _,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_ipc_convention() {
        assert!(validate_name("/events-test").is_ok());
        assert!(matches!(
            validate_name("events-test"),
            Err(QueueError::Resource { .. })
        ));
        assert!(validate_name("/").is_err());
        assert!(validate_name("/a/b").is_err());
        assert!(validate_name(&format!("/{}", "x".repeat(NAME_MAX + 1))).is_err());
    }

    #[test]
    fn open_rejects_invalid_name_before_touching_os() {
        let err = PosixMessageQueue::open("no-slash", 1, 16).err().expect("error");
        assert!(matches!(err, QueueError::Resource { .. }));
    }
}
