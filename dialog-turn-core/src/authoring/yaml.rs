use super::dto::DialogTreeDto;
use anyhow::Result;

/// Parse a YAML string into a DialogTreeDto.
///
/// Validation is NOT performed here; call `validate_dto()` or use
/// `compile_tree()` / `compile_tree_yaml()`, which validate before lowering.
pub fn parse_tree_yaml(yaml_str: &str) -> Result<DialogTreeDto> {
    let dto: DialogTreeDto = serde_yaml::from_str(yaml_str)?;
    Ok(dto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::dto::*;
    use crate::tree::AfterDigression;

    #[test]
    fn test_basic_yaml_parse() {
        let yaml = r#"
nodes:
  - condition: {intent: greetings}
    response: "Good day!"
  - condition: true
    response: "?"
"#;
        let dto = parse_tree_yaml(yaml).unwrap();
        assert_eq!(dto.nodes.len(), 2);
        assert!(dto.subtrees.is_empty());
    }

    #[test]
    fn test_yaml_with_followup_and_settings() {
        let yaml = r#"
nodes:
  - label: menu
    condition: {intent: menu}
    response: "Cake or pie?"
    settings:
      after_digression_followup: never_return
    followup:
      - condition: {entity_value: {entity: menu, value: cake}}
        response: cake
      - condition: true
        response: fallback
"#;
        let dto = parse_tree_yaml(yaml).unwrap();
        match &dto.nodes[0] {
            NodeEntryDto::Node(node) => {
                assert_eq!(node.label.as_deref(), Some("menu"));
                assert_eq!(node.followup.len(), 2);
                assert_eq!(
                    node.settings.after_digression_followup,
                    AfterDigression::NeverReturn
                );
            }
            other => panic!("Expected Node, got {:?}", other),
        }
    }

    #[test]
    fn test_yaml_with_slots_and_subtree() {
        let yaml = r#"
nodes:
  - label: book
    condition: {intent: book}
    slot_filling:
      - name: guests
        check_for: {entity: number}
        prompt: "How many guests?"
        found: "Table for {slots.guests}."
      - name: note
        check_for: {entity: note}
    slot_handlers:
      - condition: {intent: cancel}
        response: [response]
    response: "Booked."
  - subtree: faq
subtrees:
  - name: faq
    guard: {intent: faq}
    nodes:
      - condition: true
        response: "We open at nine."
"#;
        let dto = parse_tree_yaml(yaml).unwrap();
        let NodeEntryDto::Node(book) = &dto.nodes[0] else {
            panic!("Expected node");
        };
        assert_eq!(book.slot_filling.len(), 2);
        assert!(book.slot_filling[0].is_required());
        assert!(!book.slot_filling[1].is_required());
        assert_eq!(book.slot_handlers.len(), 1);
        assert!(matches!(&dto.nodes[1], NodeEntryDto::Include(r) if r.subtree == "faq"));
        assert_eq!(dto.subtrees[0].name, "faq");
    }

    /// Unknown node keys are rejected rather than silently ignored.
    #[test]
    fn test_misspelled_key_fails() {
        let yaml = r#"
nodes:
  - condition: true
    respnose: "typo"
"#;
        assert!(parse_tree_yaml(yaml).is_err());
    }
}
