/// Round-trip tests for the record store.
use ankitag::store::{self, MalformedPolicy, StoreError};
use ankitag::FieldSchema;
use anyhow::Result;

const EXPORT: &str = "#separator:tab\n#html:true\n#notetype column:2\n#deck column:3\n#tags column:12\nguid-a\tBasic\tDefault\tCross entropy\tCE expects logits<br><br>NLL expects probabilities\t\t\t\t\t\t\tml\nguid-b\tBasic\tDefault\tTerminal lucidity\t\t\t\t\t\t\t\t\nguid-c\tCloze\tHistory\t{{c1::1066}} Hastings\t\t\t\t\t\t\t\tleech\textra\n";

#[test]
fn load_then_save_reproduces_export() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, EXPORT)?;

    let deck = store::load(&input, &FieldSchema::default())?;
    assert_eq!(deck.comments.len(), 5);
    assert_eq!(deck.records.len(), 3);

    store::save(&output, &deck.comments, &deck.records)?;
    assert_eq!(std::fs::read_to_string(&output)?, EXPORT);
    Ok(())
}

#[test]
fn comments_are_written_before_records_even_if_interleaved() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    let row = "g\tBasic\tDefault\tfront\tback\t\t\t\t\t\t\t";
    std::fs::write(&input, format!("#first\n{row}\n#second\n"))?;

    let deck = store::load(&input, &FieldSchema::default())?;
    store::save(&output, &deck.comments, &deck.records)?;

    assert_eq!(
        std::fs::read_to_string(&output)?,
        format!("#first\n#second\n{row}\n")
    );
    Ok(())
}

#[test]
fn strict_policy_rejects_short_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.txt");
    std::fs::write(&input, format!("{EXPORT}too\tshort\n"))?;

    let result = store::load(&input, &FieldSchema::default())?.apply_policy(MalformedPolicy::Abort);
    assert!(matches!(
        result,
        Err(StoreError::MalformedRecord {
            line: 9,
            expected: 12,
            found: 2
        })
    ));
    Ok(())
}

#[test]
fn missing_input_is_an_io_error() {
    let result = store::load(
        std::path::Path::new("/nonexistent/deck.txt"),
        &FieldSchema::default(),
    );
    assert!(matches!(result, Err(StoreError::Io(_))));
}
