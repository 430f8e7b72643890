//! Reply formatting.

use crate::proposals::model::ProposalRecord;

/// Render records into the Markdown reply body.
///
/// A single record is shown without its identifier; several records are
/// each prefixed with `MSCid:` and separated by a blank line. Returns
/// `None` when there is nothing to say.
pub fn format_reply(records: &[ProposalRecord]) -> Option<String> {
    match records {
        [] => None,
        [record] => Some(format_record(record, false)),
        many => Some(
            many.iter()
                .map(|r| format_record(r, true))
                .collect::<Vec<_>>()
                .join("\n\n"),
        ),
    }
}

fn format_record(record: &ProposalRecord, with_id: bool) -> String {
    let line = format!("[{}]({}) by {}", record.title, record.url, record.author);
    if with_id {
        format!("MSC{}: {line}", record.id)
    } else {
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, title: &str, author: &str) -> ProposalRecord {
        ProposalRecord {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            url: format!("https://x/{id}"),
        }
    }

    #[test]
    fn empty_is_none() {
        assert_eq!(format_reply(&[]), None);
    }

    #[test]
    fn single_record_has_no_prefix() {
        let reply = format_reply(&[record("1234", "Example", "@alice")]).unwrap();
        assert_eq!(reply, "[Example](https://x/1234) by @alice");
    }

    #[test]
    fn multiple_records_prefixed_and_separated() {
        let reply = format_reply(&[
            record("1234", "Example", "@alice"),
            record("42", "Answer", "@bob"),
        ])
        .unwrap();
        assert_eq!(
            reply,
            "MSC1234: [Example](https://x/1234) by @alice\n\n\
             MSC42: [Answer](https://x/42) by @bob"
        );
    }

    #[test]
    fn preserves_input_order() {
        let reply = format_reply(&[
            record("3", "C", "@c"),
            record("1", "A", "@a"),
            record("2", "B", "@b"),
        ])
        .unwrap();
        let ids: Vec<_> = reply
            .split("\n\n")
            .map(|line| line.split(':').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["MSC3", "MSC1", "MSC2"]);
    }
}
