//! Printing statements to stderr, for warnings and (optionally)
//! progress information.

use std::sync::atomic::AtomicBool;

/// Whether `info!` prints anything. Changed via
/// `awidget::warn::DO_INFO.store(true, std::sync::atomic::Ordering::SeqCst);`
pub static DO_INFO: AtomicBool = AtomicBool::new(false);

#[macro_export]
macro_rules! warn {
    ($formatstr:expr $(,$arg:expr)*) => { {
        use std::io::Write;
        let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
        let _ = write!(&mut outp, "W: ");
        let _ = write!(&mut outp, $formatstr $(,$arg)*);
        let _ = writeln!(&mut outp, " at {:?} line {}", file!(), line!());
        let _ = outp.flush();
    } }
}

#[macro_export]
macro_rules! nowarn {
    ($formatstr:expr $(,$arg:expr)*) => {
    }
}

/// Like `warn!` but only prints if `DO_INFO` is set, and without
/// the source location.
#[macro_export]
macro_rules! info {
    { $fmt:expr $(,$arg:expr)* } => {
        if $crate::warn::DO_INFO.load(std::sync::atomic::Ordering::SeqCst) {
            use std::io::Write;
            let mut outp = std::io::BufWriter::new(std::io::stderr().lock());
            let _ = write!(&mut outp, "I: ");
            let _ = write!(&mut outp, $fmt $(,$arg)*);
            let _ = writeln!(&mut outp);
            let _ = outp.flush();
        }
    }
}

