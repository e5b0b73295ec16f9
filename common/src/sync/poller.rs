//! Single-worker descriptor multiplexer.
//!
//! A [`Poller`] waits on a dynamic set of descriptors from one worker thread
//! and dispatches every ready descriptor to its callback. The set may be
//! changed from any thread, including from inside a callback.
//!
//! # States
//!
//! - **Idle**: no worker thread exists.
//! - **Active**: the worker is blocked in `poll(2)` while holding the state lock.
//! - **Handoff**: the worker was woken through the internal pipe and waits on
//!   a condition variable until the pending mutation has been applied.
//!
//! A mutator on a foreign thread writes one byte to the pipe, takes the state
//! lock, mutates, marks the request serviced and signals the condition
//! variable. The worker counts the bytes it drained and only re-enters
//! `poll(2)` once every announced request has been serviced, so a request
//! that lands while callbacks are running is never lost.
//!
//! Callbacks run with the state lock released. A foreign-thread `remove`
//! does not return while the worker is still inside the callback of the
//! descriptor being removed, so the caller may close it right after.
//!
//! Entry 0 of the watched list is always the read end of the pipe.

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use crate::error::Result;

/// Function run on the worker for every ready descriptor.
pub type ReadFn<C> = fn(RawFd, &C);

struct State<C> {
    watched: Vec<libc::pollfd>,
    callbacks: HashMap<RawFd, C>,
    /// Wake-up bytes drained by the worker.
    announced: u64,
    /// Mutations applied by foreign threads.
    serviced: u64,
    running: bool,
    /// Descriptor whose callback is running on the worker.
    dispatching: Option<RawFd>,
}

struct Shared<C> {
    state: Mutex<State<C>>,
    handoff: Condvar,
    dispatched: Condvar,
    worker: spin::Mutex<Option<ThreadId>>,
    read_fn: ReadFn<C>,
}

#[derive(Default)]
struct Control {
    worker: Option<JoinHandle<()>>,
    sync: Option<OwnedFd>,
    wake: Option<OwnedFd>,
}

/// Multiplexes descriptor readiness onto callbacks of type `C`.
pub struct Poller<C> {
    shared: Arc<Shared<C>>,
    /// Serialises foreign-thread mutators. Never taken on the worker.
    control: Mutex<Control>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

const fn sync_slot(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN | libc::POLLPRI,
        revents: 0,
    }
}

impl<C> State<C> {
    fn insert(&mut self, fd: RawFd, events: i16, callback: C) {
        match self.watched.iter_mut().skip(1).find(|p| p.fd == fd) {
            Some(slot) => slot.events = events,
            None => {
                self.watched.push(libc::pollfd {
                    fd,
                    events,
                    revents: 0,
                });
                log::trace!("watching descriptor {fd}");
            }
        }
        self.callbacks.insert(fd, callback);
    }

    fn erase(&mut self, fd: RawFd) {
        if let Some(pos) = self.watched.iter().skip(1).position(|p| p.fd == fd) {
            self.watched.remove(pos + 1);
            log::trace!("removed descriptor {fd}");
        }
        self.callbacks.remove(&fd);
    }

    fn is_empty(&self) -> bool {
        self.watched.len() <= 1
    }
}

impl<C: Clone + Send + 'static> Poller<C> {
    /// Create an idle poller. `read_fn` is run on the worker for every ready
    /// descriptor together with the descriptor's callback.
    pub fn new(read_fn: ReadFn<C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    watched: vec![sync_slot(-1)],
                    callbacks: HashMap::new(),
                    announced: 0,
                    serviced: 0,
                    running: false,
                    dispatching: None,
                }),
                handoff: Condvar::new(),
                dispatched: Condvar::new(),
                worker: spin::Mutex::new(None),
                read_fn,
            }),
            control: Mutex::new(Control::default()),
        }
    }

    /// Watch `fd` for `events` and dispatch it to `callback`.
    ///
    /// Adding a descriptor that is already watched replaces its callback.
    /// The first descriptor starts the worker thread.
    pub fn add(&self, fd: RawFd, events: i16, callback: C) -> Result<()> {
        if self.on_worker() {
            lock(&self.shared.state).insert(fd, events, callback);
            return Ok(());
        }

        let mut control = lock(&self.control);
        if control.worker.is_none() {
            let mut state = lock(&self.shared.state);
            state.watched.truncate(1);
            state.callbacks.clear();
            state.insert(fd, events, callback);
            drop(state);
            return self.spawn(&mut control);
        }

        let mut state = self.request(&control)?;
        state.insert(fd, events, callback);
        if state.running {
            state.serviced += 1;
            drop(state);
            self.shared.handoff.notify_all();
            return Ok(());
        }

        // The worker went idle on its own; restart it with the updated set.
        drop(state);
        self.reap(&mut control);
        self.spawn(&mut control)
    }

    /// Stop watching `fd`. Removing the last descriptor stops the worker.
    ///
    /// The descriptor must stay open until this returns. When called off the
    /// worker, this also waits for a callback already running for `fd`.
    pub fn remove(&self, fd: RawFd) -> Result<()> {
        if self.on_worker() {
            // The worker notices an empty set once the current dispatch ends.
            lock(&self.shared.state).erase(fd);
            return Ok(());
        }

        let mut control = lock(&self.control);
        if control.worker.is_none() {
            lock(&self.shared.state).erase(fd);
            return Ok(());
        }

        let mut state = self.request(&control)?;
        state.erase(fd);
        let running = state.running;
        if running {
            state.serviced += 1;
        }
        while state.dispatching == Some(fd) {
            log::trace!("waiting for the callback of descriptor {fd} to return");
            state = self
                .shared
                .dispatched
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        let empty = state.is_empty();
        drop(state);
        self.shared.handoff.notify_all();

        if empty {
            self.reap(&mut control);
            lock(&self.shared.state).callbacks.clear();
        } else if !running {
            self.reap(&mut control);
            self.spawn(&mut control)?;
        }
        Ok(())
    }

    /// Whether a worker thread is currently alive.
    pub fn is_active(&self) -> bool {
        lock(&self.control)
            .worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn on_worker(&self) -> bool {
        *self.shared.worker.lock() == Some(thread::current().id())
    }

    /// Wake the worker out of `poll(2)` and take the state lock.
    fn request(&self, control: &Control) -> Result<MutexGuard<'_, State<C>>> {
        if let Some(wake) = &control.wake {
            log::trace!("requesting worker to stop polling");
            loop {
                let rv = unsafe { libc::write(wake.as_raw_fd(), [1u8].as_ptr().cast(), 1) };
                if rv >= 0 {
                    break;
                }
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::Interrupted {
                    return Err(err.into());
                }
            }
        }
        Ok(lock(&self.shared.state))
    }

    fn spawn(&self, control: &mut Control) -> Result<()> {
        let (sync, wake) = pipe()?;
        let sync_fd = sync.as_raw_fd();
        {
            let mut state = lock(&self.shared.state);
            state.watched[0] = sync_slot(sync_fd);
            state.announced = 0;
            state.serviced = 0;
            state.running = true;
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("lld-poller".into())
            .spawn(move || run(shared, sync_fd));
        match handle {
            Ok(handle) => {
                log::debug!("poller worker started");
                control.worker = Some(handle);
                control.sync = Some(sync);
                control.wake = Some(wake);
                Ok(())
            }
            Err(err) => {
                lock(&self.shared.state).running = false;
                Err(err.into())
            }
        }
    }

    /// Close the wake-up pipe and join the worker.
    fn reap(&self, control: &mut Control) {
        // Dropping the write end delivers POLLHUP to the worker.
        control.wake.take();
        if let Some(handle) = control.worker.take() {
            if handle.join().is_err() {
                log::error!("poller worker panicked");
            }
        }
        control.sync.take();

        let mut state = lock(&self.shared.state);
        state.watched[0] = sync_slot(-1);
        state.running = false;
        log::debug!("poller worker stopped");
    }
}

impl<C> Drop for Poller<C> {
    fn drop(&mut self) {
        let control = self.control.get_mut().unwrap_or_else(PoisonError::into_inner);
        control.wake.take();
        if let Some(handle) = control.worker.take() {
            if *self.shared.worker.lock() == Some(thread::current().id()) {
                log::warn!("poller dropped from its own worker, detaching");
                return;
            }
            let _ = handle.join();
        }
    }
}

/// Marks the poller idle however the worker leaves its loop.
struct Exit<'a, C>(&'a Shared<C>);

impl<C> Drop for Exit<'_, C> {
    fn drop(&mut self) {
        let mut state = lock(&self.0.state);
        state.running = false;
        state.dispatching = None;
        drop(state);
        self.0.dispatched.notify_all();
        *self.0.worker.lock() = None;
    }
}

fn run<C: Clone>(shared: Arc<Shared<C>>, sync_fd: RawFd) {
    *shared.worker.lock() = Some(thread::current().id());
    let _exit = Exit(&shared);

    let mut state = lock(&shared.state);
    loop {
        let rv = unsafe {
            libc::poll(
                state.watched.as_mut_ptr(),
                state.watched.len() as libc::nfds_t,
                -1,
            )
        };
        if rv < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            log::error!("poll failed, stopping worker: {err}");
            state.running = false;
            break;
        }

        let sync = state.watched[0].revents;
        if sync != 0 {
            if sync & libc::POLLHUP != 0 {
                log::trace!("accepting terminate request");
                break;
            }

            let mut buf = [0u8; 64];
            let n = unsafe { libc::read(sync_fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n > 0 {
                state.announced += n as u64;
            }

            log::trace!("giving control of the watched set away");
            while state.serviced < state.announced {
                state = shared
                    .handoff
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            log::trace!("restarting poll with {} descriptors", state.watched.len() - 1);
            continue;
        }

        let ready: Vec<RawFd> = state.watched[1..]
            .iter()
            .filter(|p| p.revents != 0)
            .map(|p| p.fd)
            .collect();
        drop(state);

        for fd in ready {
            let callback = {
                let mut state = lock(&shared.state);
                let callback = state.callbacks.get(&fd).cloned();
                if callback.is_some() {
                    state.dispatching = Some(fd);
                }
                callback
            };
            let Some(callback) = callback else {
                log::trace!("descriptor {fd} ready without an active callback");
                continue;
            };

            (shared.read_fn)(fd, &callback);

            lock(&shared.state).dispatching = None;
            shared.dispatched.notify_all();
        }

        state = lock(&shared.state);
        if state.is_empty() {
            // Cleared under the same lock so a concurrent `add` restarts us.
            log::trace!("nothing left to watch, worker exiting");
            state.running = false;
            break;
        }
    }
}

fn pipe() -> Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as RawFd; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: pipe2 succeeded, both descriptors are fresh and owned here.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}
