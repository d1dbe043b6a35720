use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::Instant;

/// Yield wire codes. User code builds these by literal, so the integers are
/// observable and fixed.
pub const SLEEP: i64 = 1;
pub const WAIT_IO_READ: i64 = 2;
pub const WAIT_IO_WRITE: i64 = 4;

/// Maximum poll latency between an event arriving and the scheduler noticing
/// it, in milliseconds.
const POLL_QUANTUM_MS: i64 = 200;

/// The VM's value representation, reduced to what crosses the scheduler
/// boundary: yield payloads, wake-up markers, and the closure handed to
/// `spawn`.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Closure(Rc<Closure>),
}

/// Opaque callable payload. The VM knows what the function id means; the
/// scheduler only carries it.
#[derive(Debug)]
pub struct Closure {
    pub func_id: usize,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn closure(func_id: usize) -> Self {
        Value::Closure(Rc::new(Closure { func_id }))
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Spawned,
    Running,
    Suspended,
    Done,
}

/// A cooperative task: one call frame with its own instruction pointer and
/// value stack. Suspended tasks park in a wait queue and re-enter the ready
/// queue with their wake-up data in `stored`.
#[derive(Debug)]
pub struct Task {
    pub ip: usize,
    pub stack: Vec<Value>,
    pub parent: Option<TaskRef>,
    pub state: TaskState,
    pub stored: Value,
    pub index: usize,
}

pub type TaskRef = Rc<RefCell<Task>>;

#[derive(Debug, Clone)]
pub struct SchedError {
    pub message: String,
}

impl SchedError {
    fn new(message: impl Into<String>) -> Self {
        SchedError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SchedError {}

struct Sleeper {
    task: TaskRef,
    deadline: f64,
    seq: u64,
}

impl PartialEq for Sleeper {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Sleeper {}

impl PartialOrd for Sleeper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Sleeper {
    // Reversed so the BinaryHeap pops the earliest deadline first; the
    // sequence number keeps equal deadlines in insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .total_cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Single-threaded cooperative scheduler.
///
/// Holds the ready queue with its cursor and three wait queues: a deadline
/// heap of sleepers plus FIFO reader and writer fd queues. Tasks leave the
/// ready queue only through a yield and come back through [`Scheduler::get_tasks`].
pub struct Scheduler {
    tasks: Vec<TaskRef>,
    current: usize,
    sleepers: BinaryHeap<Sleeper>,
    sleeper_seq: u64,
    readers: Vec<(TaskRef, i32)>,
    writers: Vec<(TaskRef, i32)>,
    epoch: Instant,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            tasks: Vec::new(),
            current: 0,
            sleepers: BinaryHeap::new(),
            sleeper_seq: 0,
            readers: Vec::new(),
            writers: Vec::new(),
            epoch: Instant::now(),
        }
    }

    /// Seconds since the scheduler was created.
    pub fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    pub fn ready_len(&self) -> usize {
        self.tasks.len()
    }

    pub fn waiting_len(&self) -> usize {
        self.sleepers.len() + self.readers.len() + self.writers.len()
    }

    pub fn current_task(&self) -> Option<TaskRef> {
        self.tasks.get(self.current).cloned()
    }

    pub fn task_at(&self, index: usize) -> Option<TaskRef> {
        self.tasks.get(index).cloned()
    }

    /// Allocates a task whose stack holds the spawned closure, links it under
    /// the current task, and puts it on the ready queue.
    pub fn spawn(&mut self, closure: Value) -> Result<TaskRef, SchedError> {
        if !matches!(closure, Value::Closure(_)) {
            return Err(SchedError::new(
                "Invalid argument for parameter 0, expect a function",
            ));
        }

        let parent = self.current_task();
        let index = match &parent {
            Some(parent) => parent.borrow().index + 1,
            None => 0,
        };
        let task = Rc::new(RefCell::new(Task {
            ip: 0,
            stack: vec![closure],
            parent,
            state: TaskState::Spawned,
            stored: Value::Nil,
            index,
        }));
        self.tasks.push(task.clone());
        Ok(task)
    }

    /// Applies one yielded value from the current task. A plain value rotates
    /// the ready queue; an `[op, arg]` list parks the task on the matching
    /// wait queue.
    pub fn handle_yield(&mut self, value: Value) -> Result<(), SchedError> {
        if self.tasks.is_empty() {
            return Err(SchedError::new("No running task"));
        }

        let Value::List(list) = value else {
            if self.current + 1 >= self.tasks.len() {
                self.get_tasks();
            }
            if !self.tasks.is_empty() {
                self.current = (self.current + 1) % self.tasks.len();
            } else {
                self.current = 0;
            }
            return Ok(());
        };

        let op = list
            .borrow()
            .first()
            .and_then(Value::as_number)
            .ok_or_else(|| SchedError::new("Yielded invalid type"))?;
        let op = op.trunc() as i64;
        let arg = list
            .borrow()
            .get(1)
            .and_then(Value::as_number)
            .ok_or_else(|| SchedError::new("Yielded invalid type"))?;

        match op {
            SLEEP => {
                let task = self.tasks[self.current].clone();
                let deadline = self.now() + arg;
                let seq = self.sleeper_seq;
                self.sleeper_seq += 1;
                self.sleepers.push(Sleeper {
                    task,
                    deadline,
                    seq,
                });
                self.suspend_current();
                Ok(())
            }
            WAIT_IO_READ => {
                let task = self.tasks[self.current].clone();
                self.readers.push((task, arg.trunc() as i32));
                self.suspend_current();
                Ok(())
            }
            WAIT_IO_WRITE => {
                let task = self.tasks[self.current].clone();
                self.writers.push((task, arg.trunc() as i32));
                self.suspend_current();
                Ok(())
            }
            other => Err(SchedError::new(format!("Invalid yield op {other}"))),
        }
    }

    fn suspend_current(&mut self) {
        let task = self.tasks.remove(self.current);
        task.borrow_mut().state = TaskState::Suspended;
        if self.current >= self.tasks.len() {
            self.get_tasks();
        }
        if self.tasks.is_empty() {
            self.current = 0;
        } else {
            self.current %= self.tasks.len();
        }
    }

    fn wake(&mut self, task: TaskRef) {
        {
            let mut task = task.borrow_mut();
            task.stored = Value::Bool(true);
            task.state = TaskState::Spawned;
        }
        self.tasks.push(task);
    }

    fn wake_expired_sleepers(&mut self) -> bool {
        let now = self.now();
        let mut woke = false;
        while let Some(next) = self.sleepers.peek() {
            if next.deadline < now {
                let sleeper = self.sleepers.pop().expect("peeked sleeper exists");
                self.wake(sleeper.task);
                woke = true;
            } else {
                break;
            }
        }
        woke
    }

    fn poll_timeout_ms(&self) -> i64 {
        match self.sleepers.peek() {
            Some(next) => {
                let until = ((next.deadline - self.now()) * 1000.0).ceil() as i64;
                until.clamp(0, POLL_QUANTUM_MS)
            }
            None => POLL_QUANTUM_MS,
        }
    }

    /// Drains the wait queues back into the ready queue: expired sleepers
    /// first, then readable fds, then writable fds. Blocks in `poll(2)` for
    /// at most the 200 ms quantum (less when a sleeper deadline is nearer);
    /// a poll timeout returns without further work.
    ///
    /// Returns 1 if any task was woken, 0 if nothing happened, -1 on a poll
    /// failure.
    pub fn get_tasks(&mut self) -> i32 {
        let woke = self.wake_expired_sleepers();

        if self.readers.is_empty() && self.writers.is_empty() && self.sleepers.is_empty() {
            return i32::from(woke);
        }
        if woke {
            // Runnable tasks exist again; don't block on the rest.
            return 1;
        }

        let timeout = self.poll_timeout_ms();
        let mut fds: Vec<libc::pollfd> = self
            .readers
            .iter()
            .map(|(_, fd)| libc::pollfd {
                fd: *fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .chain(self.writers.iter().map(|(_, fd)| libc::pollfd {
                fd: *fd,
                events: libc::POLLOUT,
                revents: 0,
            }))
            .collect();

        let status = unsafe {
            libc::poll(
                fds.as_mut_ptr(),
                fds.len() as libc::nfds_t,
                timeout as libc::c_int,
            )
        };
        if status < 0 {
            return -1;
        }
        if status == 0 {
            return 0;
        }

        let reader_count = self.readers.len();
        let mut woke_io = false;

        let readers = std::mem::take(&mut self.readers);
        for (slot, (task, fd)) in readers.into_iter().enumerate() {
            let revents = fds[slot].revents;
            if revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0 {
                self.wake(task);
                woke_io = true;
            } else {
                self.readers.push((task, fd));
            }
        }

        let writers = std::mem::take(&mut self.writers);
        for (slot, (task, fd)) in writers.into_iter().enumerate() {
            let revents = fds[reader_count + slot].revents;
            if revents & (libc::POLLOUT | libc::POLLERR | libc::POLLHUP) != 0 {
                self.wake(task);
                woke_io = true;
            } else {
                self.writers.push((task, fd));
            }
        }

        i32::from(woke_io)
    }
}

#[cfg(test)]
mod tests {
    use super::{Scheduler, TaskState, Value, SLEEP, WAIT_IO_READ, WAIT_IO_WRITE};
    use std::time::Instant;

    fn sleep_value(seconds: f64) -> Value {
        Value::list(vec![Value::Number(SLEEP as f64), Value::Number(seconds)])
    }

    #[test]
    fn spawn_requires_a_closure() {
        let mut scheduler = Scheduler::new();
        let error = scheduler
            .spawn(Value::Number(1.0))
            .expect_err("expected spawn error");
        assert!(error.message.contains("expect a function"));
    }

    #[test]
    fn spawn_links_child_under_current_task() {
        let mut scheduler = Scheduler::new();
        let parent = scheduler.spawn(Value::closure(0)).expect("spawn parent");
        let child = scheduler.spawn(Value::closure(1)).expect("spawn child");
        assert_eq!(parent.borrow().index, 0);
        assert_eq!(child.borrow().index, 1);
        assert!(child.borrow().parent.is_some());
        assert_eq!(child.borrow().state, TaskState::Spawned);
    }

    #[test]
    fn plain_yield_rotates_the_ready_queue() {
        let mut scheduler = Scheduler::new();
        for id in 0..3 {
            scheduler.spawn(Value::closure(id)).expect("spawn task");
        }
        let first = scheduler.current_task().expect("current task");
        scheduler.handle_yield(Value::Nil).expect("yield");
        let second = scheduler.current_task().expect("current task");
        assert!(!std::rc::Rc::ptr_eq(&first, &second));
        scheduler.handle_yield(Value::Nil).expect("yield");
        scheduler.handle_yield(Value::Nil).expect("yield");
        let wrapped = scheduler.current_task().expect("current task");
        assert!(std::rc::Rc::ptr_eq(&first, &wrapped));
    }

    #[test]
    fn sleeping_tasks_resume_within_the_poll_quantum() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Value::closure(0)).expect("spawn task");
        scheduler.spawn(Value::closure(1)).expect("spawn task");

        let start = Instant::now();
        scheduler.handle_yield(sleep_value(0.05)).expect("yield");
        scheduler.handle_yield(sleep_value(0.05)).expect("yield");
        assert_eq!(scheduler.ready_len(), 0);
        assert_eq!(scheduler.waiting_len(), 2);

        while scheduler.ready_len() < 2 {
            assert!(start.elapsed().as_secs_f64() < 3.0, "scheduler stalled");
            scheduler.get_tasks();
        }
        assert!(start.elapsed().as_secs_f64() < 0.3);

        for index in 0..2 {
            let task = scheduler.task_at(index).expect("ready task");
            assert!(matches!(task.borrow().stored, Value::Bool(true)));
        }
    }

    #[test]
    fn sleepers_wake_in_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Value::closure(0)).expect("spawn task");
        scheduler.spawn(Value::closure(1)).expect("spawn task");

        scheduler.handle_yield(sleep_value(0.0)).expect("yield");
        scheduler.handle_yield(sleep_value(0.0)).expect("yield");

        let start = Instant::now();
        while scheduler.ready_len() < 2 {
            assert!(start.elapsed().as_secs_f64() < 3.0, "scheduler stalled");
            scheduler.get_tasks();
        }

        let first = scheduler.task_at(0).expect("ready task");
        let second = scheduler.task_at(1).expect("ready task");
        assert_eq!(first.borrow().index, 0);
        assert_eq!(second.borrow().index, 1);
    }

    #[test]
    fn io_readiness_wakes_readers_before_writers() {
        let mut fds = [0i32; 2];
        let status = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(status, 0, "pipe(2) failed");
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let mut scheduler = Scheduler::new();
        scheduler.spawn(Value::closure(0)).expect("spawn reader");
        scheduler.spawn(Value::closure(1)).expect("spawn writer");

        scheduler
            .handle_yield(Value::list(vec![
                Value::Number(WAIT_IO_READ as f64),
                Value::Number(read_fd as f64),
            ]))
            .expect("yield reader");

        // Make both fds ready before the writer parks: parking the last task
        // drains the wait queues once.
        let byte = [1u8];
        let written = unsafe { libc::write(write_fd, byte.as_ptr().cast(), 1) };
        assert_eq!(written, 1);

        scheduler
            .handle_yield(Value::list(vec![
                Value::Number(WAIT_IO_WRITE as f64),
                Value::Number(write_fd as f64),
            ]))
            .expect("yield writer");

        let start = Instant::now();
        while scheduler.ready_len() < 2 {
            assert!(start.elapsed().as_secs_f64() < 3.0, "scheduler stalled");
            scheduler.get_tasks();
        }

        let first = scheduler.task_at(0).expect("ready task");
        let second = scheduler.task_at(1).expect("ready task");
        assert_eq!(first.borrow().index, 0, "reader wakes first");
        assert_eq!(second.borrow().index, 1);
        assert!(matches!(first.borrow().stored, Value::Bool(true)));

        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    #[test]
    fn rejects_malformed_yield_values() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(Value::closure(0)).expect("spawn task");

        let error = scheduler
            .handle_yield(Value::list(vec![Value::Str("sleep".into())]))
            .expect_err("expected yield error");
        assert_eq!(error.message, "Yielded invalid type");

        let error = scheduler
            .handle_yield(Value::list(vec![Value::Number(SLEEP as f64), Value::Nil]))
            .expect_err("expected yield error");
        assert_eq!(error.message, "Yielded invalid type");

        let error = scheduler
            .handle_yield(Value::list(vec![
                Value::Number(3.0),
                Value::Number(0.0),
            ]))
            .expect_err("expected yield error");
        assert_eq!(error.message, "Invalid yield op 3");
    }

    #[test]
    fn sleep_suspends_only_the_current_task() {
        let mut scheduler = Scheduler::new();
        let sleeper = scheduler.spawn(Value::closure(0)).expect("spawn task");
        let runner = scheduler.spawn(Value::closure(1)).expect("spawn task");

        scheduler.handle_yield(sleep_value(5.0)).expect("yield");
        assert_eq!(scheduler.ready_len(), 1);
        assert_eq!(sleeper.borrow().state, TaskState::Suspended);
        let current = scheduler.current_task().expect("current task");
        assert!(std::rc::Rc::ptr_eq(&current, &runner));
    }
}
