//! Access log for the API server in the Combined Log Format (Apache
//! style), <https://httpd.apache.org/docs/2.4/logs.html>, with the
//! request duration appended.

use std::{io::{stderr, BufWriter, Write},
          mem::swap,
          panic,
          path::PathBuf,
          sync::Mutex,
          time::{Duration, Instant, SystemTime}};
use std::fs::File;

use anyhow::{Result, Context, anyhow};
use chrono::{DateTime, Utc, Datelike, Timelike};
use rouille::{Request, Response, ResponseBody};

use crate::warn;

static MONTHS: &[&str; 12] = &[
    "Jan", "Feb", "Mar", "Apr", "May", "Jun",
    "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

// "06/Dec/2023:02:02:47 +0000"
pub fn write_time(
    outp: &mut impl Write,
    time: SystemTime
) -> Result<()> {
    let dt: DateTime<Utc> = DateTime::from(time);
    write!(outp, "{:02}/{}/{:04}:{:02}:{:02}:{:02} +0000",
           dt.day(), MONTHS[dt.month0() as usize], dt.year(),
           dt.hour(), dt.minute(), dt.second())?;
    Ok(())
}

// Takes the body out of the response to learn its size, and puts it
// back; rouille has no accessor for it.
fn response_len(response: &mut Response) -> Option<usize> {
    let mut body = ResponseBody::empty();
    swap(&mut body, &mut response.data);
    let (data, length) = body.into_reader_and_size();
    body = match length {
        Some(len) => ResponseBody::from_reader_and_size(data, len),
        None => ResponseBody::from_reader(data),
    };
    swap(&mut body, &mut response.data);
    length
}

// 127.0.0.1 - - [06/Dec/2023:02:02:47 +0000] "GET /api/?model=category HTTP/1.1" 200 447 "-" "curl/8.0" 1.2ms
pub fn write_combined(
    outp: &mut impl Write,
    request: &Request,
    duration: Duration,
    response: &mut Response,
) -> Result<()> {
    // when the entry is made, not when the request started
    let now = SystemTime::now();
    let len = response_len(response).unwrap_or(0);
    write!(outp, "{} - - [", request.remote_addr().ip())?;
    write_time(outp, now)?;
    writeln!(outp, "] \"{} {} HTTP/1.1\" {} {} {:?} {:?} {duration:?}",
             request.method(),
             request.raw_url(),
             response.status_code,
             len,
             request.header("Referer").unwrap_or("-"),
             request.header("User-Agent").unwrap_or("-"))?;
    outp.flush()?;
    Ok(())
}


pub fn open_log_output(path: PathBuf) -> Result<BufWriter<File>> {
    let mut outp = File::options();
    outp.write(true).append(true).create(true);
    if let Some(parent) = path.parent() {
        let _ignore = std::fs::create_dir_all(parent);
    }
    Ok(BufWriter::new(outp.open(&path).with_context(
        || anyhow!("opening log for output: {:?}", path.to_string_lossy()))?))
}

/// Where access log entries go. Every entry is flushed.
pub struct AccessLog {
    outp: Mutex<Box<dyn Write + Send>>,
}

impl AccessLog {
    /// `api_access.log` in `logdir`, or stderr without one.
    pub fn open(logdir: Option<&str>) -> Result<Self> {
        let outp: Box<dyn Write + Send> = match logdir {
            Some(dir) => Box::new(open_log_output(
                PathBuf::from(dir).join("api_access.log"))?),
            None => Box::new(stderr()),
        };
        Ok(AccessLog { outp: Mutex::new(outp) })
    }

    pub fn from_writer(outp: Box<dyn Write + Send>) -> Self {
        AccessLog { outp: Mutex::new(outp) }
    }

    /// Run `handler` and log its response. Panics are logged to
    /// stderr and passed on.
    pub fn log<F>(&self, request: &Request, handler: F) -> Response
    where F: FnOnce() -> Response
    {
        let start = Instant::now();
        let result = panic::catch_unwind(panic::AssertUnwindSafe(handler));
        let elapsed = start.elapsed();
        match result {
            Ok(mut response) => {
                match self.outp.lock() {
                    Ok(mut outp) =>
                        if let Err(e) = write_combined(&mut *outp, request, elapsed,
                                                       &mut response) {
                            warn!("could not write to access log: {e:#}")
                        },
                    Err(_) => warn!("access log is poisoned"),
                }
                response
            }
            Err(payload) => {
                warn!("[panic] handling {} {} after {elapsed:?}",
                      request.method(), request.raw_url());
                panic::resume_unwind(payload)
            }
        }
    }
}
