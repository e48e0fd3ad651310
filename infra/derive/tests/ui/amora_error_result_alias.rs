use amora_derive::amora_error;
use std::borrow::Cow;

#[amora_error(result)]
pub enum AliasError {
    #[error("IO error{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },
}

fn open() -> Result<()> {
    let _ = std::fs::metadata("/definitely/not/here")?;
    Ok(())
}

fn main() {
    assert!(matches!(open(), Err(AliasError::Io { context: None, .. })));
}
