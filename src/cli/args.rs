// ARGV NORMALIZATION AHEAD OF clap
// cpuscale HAS ALWAYS TAKEN SINGLE-DASH LONG FLAGS (-delay 5, -mincpu 2,
// -loadtest), READ A FLAG'S VALUE FROM THE NEXT SLOT WITHOUT CONSUMING IT,
// AND IGNORED ANYTHING IT DID NOT RECOGNIZE. normalize() REWRITES SUCH AN
// argv INTO CANONICAL --flag / --flag=VALUE FORM SO clap NEVER REJECTS IT.

const SUBCOMMANDS: &[&str] = &["check", "status"];

// ACCEPTED SPELLINGS -> CANONICAL LONG FLAG
const VALUE_FLAGS: &[(&[&str], &str)] = &[
    (&["-L", "--low"], "--low"),
    (&["-H", "--high"], "--high"),
    (&["-delay", "--delay"], "--delay"),
    (&["-mincpu", "--mincpu"], "--mincpu"),
];

const SWITCHES: &[(&[&str], &str)] = &[
    (&["-D", "--daemon"], "--daemon"),
    (&["-loadtest", "--loadtest"], "--loadtest"),
    (&["-dump-log", "--dump-log"], "--dump-log"),
    (&["-h", "--help"], "--help"),
    (&["-V", "--version"], "--version"),
];

fn canonical(table: &[(&[&str], &'static str)], arg: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(spellings, _)| spellings.contains(&arg))
        .map(|(_, canon)| *canon)
}

// "-v", "-vv", ... OR "--verbose"
fn verbose_count(arg: &str) -> usize {
    if arg == "--verbose" {
        return 1;
    }
    match arg.strip_prefix('-') {
        Some(vs) if !vs.is_empty() && vs.bytes().all(|b| b == b'v') => vs.len(),
        _ => 0,
    }
}

fn valued(canon: &str, value: &str) -> String {
    // EMPTY READS AS 0, SAME AS AN UNPARSABLE VALUE
    let value = if value.is_empty() { "0" } else { value };
    format!("{}={}", canon, value)
}

pub fn normalize<I, T>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let (prog, rest) = match args.split_first() {
        Some((prog, rest)) => (prog.clone(), rest),
        None => ("cpuscale".to_string(), &[][..]),
    };
    let mut out = vec![prog];

    // SUBCOMMANDS TAKE NO FLAGS BEYOND --help
    if let Some(first) = rest.first().filter(|a| SUBCOMMANDS.contains(&a.as_str())) {
        out.push(first.clone());
        if rest[1..].iter().any(|a| a == "-h" || a == "--help") {
            out.push("--help".to_string());
        }
        return out;
    }

    for (i, arg) in rest.iter().enumerate() {
        if let Some(canon) = canonical(SWITCHES, arg) {
            out.push(canon.to_string());
        } else if let Some(canon) = canonical(VALUE_FLAGS, arg) {
            // VALUE SLOT IS READ, NOT CONSUMED. A TRAILING FLAG HAS NONE.
            if let Some(value) = rest.get(i + 1) {
                out.push(valued(canon, value));
            }
        } else if let Some((name, value)) = arg.split_once('=') {
            if let Some(canon) = canonical(VALUE_FLAGS, name) {
                out.push(valued(canon, value));
            }
        } else {
            for _ in 0..verbose_count(arg) {
                out.push("-v".to_string());
            }
        }
    }
    out
}
