//! Sign a PDF with a PKCS#12 bundle
//!
//! Usage:
//!   sign_pdf <input.pdf> <bundle.p12> <output.pdf> [request.json]
//!
//! The bundle passphrase is read from `P12_PASSPHRASE` (empty when unset).
//! `PDF_SIGNER_SIGNATURE_SIZE` overrides the reserved signature size.
//! The optional request file uses the form field names `reason`,
//! `contactInfo`, `name`, `location` and `widgetRectX1` .. `widgetRectY2`.

use pdf_signer::signatures::SignatureFields;
use pdf_signer::{DocumentSigner, Error, SignatureRequest, SignerConfig};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

const PASSPHRASE_VAR: &str = "P12_PASSPHRASE";

struct SignArgs {
    input: PathBuf,
    bundle: PathBuf,
    output: PathBuf,
    request: Option<PathBuf>,
}

impl SignArgs {
    fn from_args() -> Option<Self> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        match args.as_slice() {
            [input, bundle, output] => Some(Self {
                input: input.into(),
                bundle: bundle.into(),
                output: output.into(),
                request: None,
            }),
            [input, bundle, output, request] => Some(Self {
                input: input.into(),
                bundle: bundle.into(),
                output: output.into(),
                request: Some(request.into()),
            }),
            _ => None,
        }
    }
}

fn load_request(path: Option<&PathBuf>) -> Result<SignatureRequest, Error> {
    let Some(path) = path else {
        return Ok(SignatureRequest::default());
    };
    let text = fs::read_to_string(path)?;
    let fields: SignatureFields = serde_json::from_str(&text)
        .map_err(|e| Error::InvalidRequest(format!("{}: {}", path.display(), e)))?;
    Ok(fields.into())
}

fn run(args: &SignArgs) -> Result<usize, Error> {
    let config = SignerConfig::default().with_env_overrides()?;
    let request = load_request(args.request.as_ref())?;
    let passphrase = std::env::var(PASSPHRASE_VAR).ok();

    let pdf = fs::read(&args.input)?;
    let bundle = fs::read(&args.bundle)?;
    let signed = DocumentSigner::new(config).sign(&pdf, &bundle, passphrase.as_deref(), &request)?;
    fs::write(&args.output, &signed)?;
    Ok(signed.len())
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(args) = SignArgs::from_args() else {
        eprintln!("Usage: sign_pdf <input.pdf> <bundle.p12> <output.pdf> [request.json]");
        return ExitCode::from(2);
    };

    match run(&args) {
        Ok(size) => {
            println!("Signed {} -> {} ({} bytes)", args.input.display(), args.output.display(), size);
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("Error ({:?}): {}", e.kind(), e);
            ExitCode::FAILURE
        },
    }
}
