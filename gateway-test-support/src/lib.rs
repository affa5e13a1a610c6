mod compiler;

pub use compiler::compile_protos;
