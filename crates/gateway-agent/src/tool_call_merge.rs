//! Merges structured tool-call deltas (keyed by `index`) into complete
//! `{id, name, arguments}` triples as they stream in, mirroring the
//! accumulation loop of the original dialogue handler.

use gateway_core::ToolCallDelta;

/// One tool call being accumulated across streamed deltas.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Fold one `ToolCallDelta` into `calls`, growing the list as new indices
/// appear and appending argument fragments to the entry at `delta.index`.
pub fn merge_tool_call_delta(calls: &mut Vec<PendingToolCall>, delta: ToolCallDelta) {
    let index = delta.index as usize;
    while calls.len() <= index {
        calls.push(PendingToolCall::default());
    }

    let entry = &mut calls[index];
    if let Some(id) = delta.id {
        entry.id = id;
    }
    if let Some(name) = delta.name {
        entry.name = name;
    }
    if let Some(fragment) = delta.arguments_fragment {
        entry.arguments.push_str(&fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments_fragment: args.map(str::to_string),
        }
    }

    #[test]
    fn argument_fragments_for_the_same_index_are_concatenated() {
        let mut calls = Vec::new();
        merge_tool_call_delta(&mut calls, delta(0, Some("t1"), Some("get_weather"), Some("{\"city\":")));
        merge_tool_call_delta(&mut calls, delta(0, None, None, Some("\"berlin\"}")));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].name, "get_weather");
        assert_eq!(calls[0].arguments, "{\"city\":\"berlin\"}");
    }

    #[test]
    fn a_higher_index_grows_the_list_with_blank_placeholders() {
        let mut calls = Vec::new();
        merge_tool_call_delta(&mut calls, delta(1, Some("t2"), Some("search"), Some("{}")));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], PendingToolCall::default());
        assert_eq!(calls[1].name, "search");
    }
}
