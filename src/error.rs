use crossbeam_channel::RecvError;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum RotatorError {
        IO(err: std::io::Error) {
            display("I/O operation error: {}", err)
            cause(err)
        }
        Watch(err: notify::Error) {
            display("directory watch error: {}", err)
            cause(err)
        }
        InvalidArgument(hint: String) {
            display("invalid argument: {}", hint)
        }
        MalformedName(hint: String) {
            display("unrecognized file name: {}", hint)
        }
        Archiver(hint: String) {
            display("archiver failed: {}", hint)
        }
        RecvError(err: RecvError) {
            display("{:?}", err)
            cause(err)
        }
    }
}

macro_rules! map_io_res {
    ($result:expr) => {
        match $result {
            Ok(v) => Ok(v),
            Err(e) => Err($crate::error::RotatorError::IO(e)),
        }
    };
}

pub type RotatorResult<T> = std::result::Result<T, RotatorError>;
