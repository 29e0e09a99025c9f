//! In-sandbox driver
//!
//! Every invocation runs the same small Python program. The submission and
//! the call description travel as a base64 JSON payload split across argv
//! entries, so no file has to be written into the (read-only) worker. The
//! driver silences user output and reports exactly one marker-prefixed JSON
//! line on the real stdout.

use crate::engine::{Call, Invocation, SandboxFault};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESULT_MARKER: &str = "__CANDOR_RESULT__";

/// Upper bound for a single argv string on Linux is 128 KiB
const ARG_CHUNK_BYTES: usize = 64 * 1024;

const MAX_MESSAGE_CHARS: usize = 500;

const DRIVER: &str = r#"
import base64, io, json, sys
try:
    import resource
except ImportError:
    resource = None

MARKER = "__CANDOR_RESULT__"
_out = sys.stdout

def _emit(report):
    _out.write(MARKER + json.dumps(report) + "\n")
    _out.flush()
    sys.exit(0)

def _describe(exc):
    return "%s: %s" % (type(exc).__name__, exc)

def _limit(name, value):
    limit = getattr(resource, name, None) if resource else None
    if limit is None or not value:
        return
    try:
        resource.setrlimit(limit, (value, value))
    except (ValueError, OSError):
        pass

def _encode(value):
    try:
        json.dumps(value, allow_nan=False)
        return value
    except (TypeError, ValueError):
        return repr(value)

cfg = json.loads(base64.b64decode("".join(sys.argv[1:])).decode("utf-8"))
_limit("RLIMIT_AS", cfg.get("memory_bytes"))
_limit("RLIMIT_CPU", cfg.get("cpu_seconds"))
sys.stdout = io.StringIO()
sys.stderr = io.StringIO()

try:
    code = compile(cfg["source"], "<submission>", "exec")
except (SyntaxError, ValueError) as exc:
    _emit({"kind": "compile", "message": _describe(exc)})

namespace = {"__name__": "__submission__"}
try:
    exec(code, namespace)
except MemoryError as exc:
    _emit({"kind": "resource", "message": _describe(exc)})
except BaseException as exc:
    _emit({"kind": "compile", "message": _describe(exc)})

if cfg["mode"] == "check":
    _emit({"kind": "ok"})

fn = namespace.get(cfg["function"])
if not callable(fn):
    public = [v for k, v in namespace.items()
              if not k.startswith("_") and callable(v) and not isinstance(v, type)]
    fn = public[-1] if public else None
if fn is None:
    _emit({"kind": "runtime", "message": "NameError: function %r is not defined" % cfg["function"]})

try:
    value = fn(*cfg["args"])
except MemoryError as exc:
    _emit({"kind": "resource", "message": _describe(exc)})
except BaseException as exc:
    _emit({"kind": "runtime", "message": _describe(exc)})
_emit({"kind": "returned", "value": _encode(value)})
"#;

#[derive(Serialize)]
struct Payload<'a> {
    source: &'a str,
    mode: &'static str,
    function: Option<&'a str>,
    args: &'a [Value],
    memory_bytes: Option<u64>,
    cpu_seconds: u64,
}

/// Interpreter arguments (after the binary) for one invocation
///
/// `memory_bytes` sets an address-space rlimit inside the driver; the Docker
/// backend passes `None` and relies on the cgroup ceiling instead.
pub fn driver_args(invocation: &Invocation<'_>, memory_bytes: Option<u64>) -> Result<Vec<String>, SandboxFault> {
    let (mode, function, args): (&'static str, Option<&str>, &[Value]) = match &invocation.call {
        Call::Check => ("check", None, &[]),
        Call::Invoke { function, args } => ("call", Some(function.as_str()), args.as_slice()),
    };

    let payload = Payload {
        source: invocation.source_code,
        mode,
        function,
        args,
        memory_bytes,
        cpu_seconds: invocation.timeout_ms.div_ceil(1000) + 1,
    };
    let encoded = STANDARD.encode(serde_json::to_vec(&payload).map_err(SandboxFault::backend)?);

    let mut argv = vec!["-I".to_string(), "-c".to_string(), DRIVER.to_string()];
    // base64 is ASCII, so byte chunks are valid strings
    argv.extend(
        encoded
            .as_bytes()
            .chunks(ARG_CHUNK_BYTES)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned()),
    );
    Ok(argv)
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DriverReport {
    Ok,
    Returned { value: Value },
    Compile { message: String },
    Runtime { message: String },
    Resource { message: String },
}

fn truncate(message: &str) -> String {
    let trimmed = message.trim();
    if trimmed.chars().count() <= MAX_MESSAGE_CHARS {
        trimmed.to_string()
    } else {
        let mut cut: String = trimmed.chars().take(MAX_MESSAGE_CHARS).collect();
        cut.push_str("...");
        cut
    }
}

/// Translate worker output into a value or a classified fault
///
/// `exit_code` is `None` when the worker was terminated by a signal.
pub fn decode_output(stdout: &str, stderr: &str, exit_code: Option<i64>) -> Result<Value, SandboxFault> {
    let report = stdout
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(RESULT_MARKER));

    match report {
        Some(json) => match serde_json::from_str::<DriverReport>(json) {
            Ok(DriverReport::Ok) => Ok(Value::Null),
            Ok(DriverReport::Returned { value }) => Ok(value),
            Ok(DriverReport::Compile { message }) => Err(SandboxFault::CompileOrSyntax(truncate(&message))),
            Ok(DriverReport::Runtime { message }) => Err(SandboxFault::Runtime(truncate(&message))),
            Ok(DriverReport::Resource { message }) => Err(SandboxFault::ResourceExceeded(truncate(&message))),
            Err(e) => Err(SandboxFault::Backend(format!("malformed driver report: {}", e))),
        },
        None => match exit_code {
            // 137 = SIGKILL (OOM killer), 152 = SIGXCPU
            None | Some(137) | Some(152) => Err(SandboxFault::ResourceExceeded(format!(
                "worker killed{}",
                exit_code.map(|c| format!(" (exit {})", c)).unwrap_or_default()
            ))),
            Some(code) => {
                let detail = stderr
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .map(truncate)
                    .unwrap_or_else(|| format!("worker exited with code {} without a result", code));
                Err(SandboxFault::Runtime(detail))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_payload(argv: &[String]) -> Value {
        let joined: String = argv[3..].concat();
        serde_json::from_slice(&STANDARD.decode(joined).unwrap()).unwrap()
    }

    #[test]
    fn test_driver_args_carry_call_payload() {
        let invocation = Invocation::call(
            "def solution(a, b): return a + b",
            "solution",
            vec![json!([1, 2, 3]), json!(-1)],
            2500,
        );
        let argv = driver_args(&invocation, Some(1024)).unwrap();

        assert_eq!(argv[0], "-I");
        assert_eq!(argv[1], "-c");
        assert!(argv[2].contains(RESULT_MARKER));

        let payload = decode_payload(&argv);
        assert_eq!(payload["mode"], json!("call"));
        assert_eq!(payload["function"], json!("solution"));
        assert_eq!(payload["args"], json!([[1, 2, 3], -1]));
        assert_eq!(payload["memory_bytes"], json!(1024));
        assert_eq!(payload["cpu_seconds"], json!(4));
    }

    #[test]
    fn test_check_payload_has_no_function() {
        let argv = driver_args(&Invocation::check("x = 1", 1000), None).unwrap();
        let payload = decode_payload(&argv);

        assert_eq!(payload["mode"], json!("check"));
        assert_eq!(payload["function"], Value::Null);
        assert_eq!(payload["memory_bytes"], Value::Null);
    }

    #[test]
    fn test_large_source_is_chunked() {
        let source = "x".repeat(200 * 1024);
        let argv = driver_args(&Invocation::check(&source, 1000), None).unwrap();

        assert!(argv.len() > 4);
        assert!(argv[3..].iter().all(|chunk| chunk.len() <= ARG_CHUNK_BYTES));
        assert_eq!(decode_payload(&argv)["source"], json!(source));
    }

    #[test]
    fn test_decode_returned_value() {
        let stdout = format!("noise\n{}{{\"kind\":\"returned\",\"value\":\"olleh\"}}\n", RESULT_MARKER);
        assert_eq!(decode_output(&stdout, "", Some(0)), Ok(json!("olleh")));
    }

    #[test]
    fn test_decode_uses_last_marker_line() {
        let stdout = format!(
            "{m}{{\"kind\":\"returned\",\"value\":1}}\n{m}{{\"kind\":\"returned\",\"value\":2}}\n",
            m = RESULT_MARKER
        );
        assert_eq!(decode_output(&stdout, "", Some(0)), Ok(json!(2)));
    }

    #[test]
    fn test_decode_faults() {
        let compile = format!("{}{{\"kind\":\"compile\",\"message\":\"SyntaxError: bad\"}}", RESULT_MARKER);
        assert_eq!(
            decode_output(&compile, "", Some(0)),
            Err(SandboxFault::CompileOrSyntax("SyntaxError: bad".into()))
        );

        let resource = format!("{}{{\"kind\":\"resource\",\"message\":\"MemoryError: \"}}", RESULT_MARKER);
        assert!(matches!(
            decode_output(&resource, "", Some(0)),
            Err(SandboxFault::ResourceExceeded(_))
        ));
    }

    #[test]
    fn test_decode_killed_worker_is_resource_fault() {
        assert!(matches!(decode_output("", "", Some(137)), Err(SandboxFault::ResourceExceeded(_))));
        assert!(matches!(decode_output("", "", None), Err(SandboxFault::ResourceExceeded(_))));
    }

    #[test]
    fn test_decode_crash_uses_stderr_tail() {
        let fault = decode_output("", "Traceback\nFatal Python error: boom\n\n", Some(1)).unwrap_err();
        assert_eq!(fault, SandboxFault::Runtime("Fatal Python error: boom".into()));
    }

    #[test]
    fn test_truncate_long_messages() {
        let long = "e".repeat(MAX_MESSAGE_CHARS + 10);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_MESSAGE_CHARS + 3);
    }
}
