mod executions;

pub use executions::ExecutionRepository;
