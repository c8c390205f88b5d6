//! Template functions
//!
//! Functions available to every manifest template:
//! - `imageFor(name)`, `version(name)`: release component lookups
//! - `atleast_version(v)`, `lessthan_version(v)`: compare against the release version
//! - `base64String(s)`, `indent(n, s)`, `trimTrailingSpace(s)`
//! - `address(cidr)`, `mask(cidr)`: IPv4 network parts
//! - `include(file, n)`, `dataURLEncode(file)`: render another template
//! - `includeData(data, n)`: indent literal data, `includeVPN()`: always true
//! - `pki(file)`, `include_pki(file, n)`, `pullSecretBase64()`: read input files
//! - `randomString(n)`

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use minijinja::{Environment, Error, ErrorKind, State, Value};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Key of the release version in the component version table
pub const RELEASE_VERSION_KEY: &str = "release";

/// Inputs the functions close over
#[derive(Clone, Debug, Default)]
pub struct FunctionContext {
    /// Component name to image pull spec
    pub images: BTreeMap<String, String>,
    /// Component name to version
    pub versions: BTreeMap<String, String>,
    /// Directory holding PKI material
    pub pki_dir: PathBuf,
    /// File holding the pull secret
    pub pull_secret_file: PathBuf,
    /// Context `include` and `dataURLEncode` render with
    pub params: Value,
}

/// Register every function on `env`
pub fn register(env: &mut Environment<'static>, ctx: FunctionContext) {
    let ctx = Arc::new(ctx);

    let c = ctx.clone();
    env.add_function("imageFor", move |name: String| lookup(&c.images, "image", &name));
    let c = ctx.clone();
    env.add_function("version", move |name: String| lookup(&c.versions, "version", &name));
    let c = ctx.clone();
    env.add_function("atleast_version", move |v: String| {
        compare_release(&c.versions, &v).map(|o| o != Ordering::Less)
    });
    let c = ctx.clone();
    env.add_function("lessthan_version", move |v: String| {
        compare_release(&c.versions, &v).map(|o| o == Ordering::Less)
    });

    env.add_function("base64String", |s: String| base64_string(&s));
    env.add_function("indent", |n: usize, s: String| indent(n, &s));
    env.add_function("trimTrailingSpace", |s: String| trim_trailing_space(&s));
    env.add_function("address", |cidr: String| cidr_address(&cidr));
    env.add_function("mask", |cidr: String| cidr_mask(&cidr));
    env.add_function("randomString", |n: usize| random_string(n));
    env.add_function("includeData", |data: String, n: usize| indent(n, &data));
    // The control plane always ships the VPN components
    env.add_function("includeVPN", || true);

    let c = ctx.clone();
    env.add_function("include", move |state: &State, file: String, n: usize| {
        render_nested(state, &file, &c.params).map(|s| indent(n, &s))
    });
    let c = ctx.clone();
    env.add_function("dataURLEncode", move |state: &State, file: String| {
        render_nested(state, &file, &c.params).map(|s| data_url(&s))
    });

    let c = ctx.clone();
    env.add_function("pki", move |file: String| {
        read_file(&c.pki_dir.join(&file)).map(|bytes| STANDARD.encode(bytes))
    });
    let c = ctx.clone();
    env.add_function("include_pki", move |file: String, n: usize| {
        let bytes = read_file(&c.pki_dir.join(&file))?;
        Ok::<_, Error>(indent(n, &String::from_utf8_lossy(&bytes)))
    });
    let c = ctx;
    env.add_function("pullSecretBase64", move || {
        read_file(&c.pull_secret_file).map(|bytes| STANDARD.encode(bytes))
    });
}

fn lookup(table: &BTreeMap<String, String>, what: &str, name: &str) -> Result<String, Error> {
    table.get(name).cloned().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("no {what} found for component {name}"),
        )
    })
}

fn compare_release(versions: &BTreeMap<String, String>, other: &str) -> Result<Ordering, Error> {
    let release = lookup(versions, "version", RELEASE_VERSION_KEY)?;
    compare_versions(&release, other)
}

fn render_nested(state: &State, file: &str, params: &Value) -> Result<String, Error> {
    state.env().get_template(file)?.render(params)
}

fn read_file(path: &std::path::Path) -> Result<Vec<u8>, Error> {
    std::fs::read(path).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("failed to read {}: {e}", path.display()),
        )
    })
}

/// Compare two versions by semver precedence
///
/// A pre-release sorts before its release. Build metadata is ignored.
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, Error> {
    Ok(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Parse a version, accepting a leading `v` and `4` or `4.8` shorthand
pub fn parse_version(v: &str) -> Result<semver::Version, Error> {
    let trimmed = v.trim();
    let core = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let (numbers, suffix) = core.split_at(core.find(['-', '+']).unwrap_or(core.len()));
    let padded = match numbers.split('.').count() {
        1 => format!("{numbers}.0.0{suffix}"),
        2 => format!("{numbers}.0{suffix}"),
        _ => core.to_string(),
    };

    let mut version = semver::Version::parse(&padded).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("invalid version {v}: {e}"),
        )
    })?;
    version.build = semver::BuildMetadata::EMPTY;
    Ok(version)
}

/// Base64 of a string
pub fn base64_string(s: &str) -> String {
    STANDARD.encode(s.as_bytes())
}

/// Prefix every line of `s` with `n` spaces
pub fn indent(n: usize, s: &str) -> String {
    let pad = " ".repeat(n);
    format!("{pad}{}", s.replace('\n', &format!("\n{pad}")))
}

/// Strip trailing whitespace
pub fn trim_trailing_space(s: &str) -> String {
    s.trim_end().to_string()
}

/// `data:` URL carrying `s` as base64 plain text
pub fn data_url(s: &str) -> String {
    format!("data:text/plain;charset=utf-8;base64,{}", base64_string(s))
}

/// Random alphanumeric string of length `n`
pub fn random_string(n: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), Error> {
    let invalid = || Error::new(ErrorKind::InvalidOperation, format!("invalid CIDR {cidr:?}"));
    let (addr, prefix) = cidr.split_once('/').ok_or_else(invalid)?;
    let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
    let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok((addr, prefix))
}

/// Address part of a CIDR
pub fn cidr_address(cidr: &str) -> Result<String, Error> {
    parse_cidr(cidr).map(|(addr, _)| addr.to_string())
}

/// Dotted netmask of a CIDR
pub fn cidr_mask(cidr: &str) -> Result<String, Error> {
    let (_, prefix) = parse_cidr(cidr)?;
    let bits = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    Ok(Ipv4Addr::from(bits).to_string())
}
