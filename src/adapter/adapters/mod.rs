pub mod llamacpp;
