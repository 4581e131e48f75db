//! Script pre-processor: one linear pass over a macro buffer that
//! balances `if`/`endif` indirectly (the executor checks those), resolves
//! loop blocks into a jump list, and rejects structural errors early:
//! nested `macro`, orphan `break`/`next`, and unmatched loop keywords.

use core_buffer::{Buffer, LineId, LoopBlock, LoopKind};
use core_status::{EdResult, Status};
use crate::token::StmtKw;

/// First word of a line, if it is a statement keyword. Continuation and
/// comment handling happens in the caller.
pub fn leading_keyword(text: &str) -> Option<(StmtKw, &str)> {
    let trimmed = text.trim_start_matches([' ', '\t']);
    let end = trimmed
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(trimmed.len());
    let word = &trimmed[..end];
    StmtKw::from_ident(word).map(|kw| (kw, trimmed[end..].trim_start_matches([' ', '\t'])))
}

/// True for lines that are blank or whole-line comments.
pub fn is_white_line(text: &str) -> bool {
    let trimmed = text.trim_start_matches([' ', '\t']);
    trimmed.is_empty() || trimmed.starts_with(crate::lexer::COMMENT_CH)
}

fn fail(buf: &Buffer, line: LineId, msg: &str) -> Status {
    Status::failure(format!(
        "{msg}, in buffer '{}' at line {}",
        buf.name(),
        buf.line_number(line)
    ))
}

/// Scan the buffer and build its loop-block list. Loop keywords of any
/// truth state get blocks, so every possible path is resolvable at
/// execution time.
pub fn preprocess(buf: &Buffer) -> EdResult<Vec<LoopBlock>> {
    struct OpenBlock {
        kind: LoopKind,
        mark: LineId,
    }
    // Completed blocks, with the parent loop's marker line recorded
    // temporarily for the multi-level break fix-up.
    let mut done: Vec<(LoopBlock, Option<LineId>)> = Vec::new();
    let mut open: Vec<OpenBlock> = Vec::new();
    let mut salt_level = 0i32;
    let mut last_was_cl = false;

    for line in buf.lines() {
        let text = String::from_utf8_lossy(buf.line_text(line)).into_owned();
        let skip = last_was_cl;
        last_was_cl = text.ends_with('\\');
        if skip || is_white_line(&text) {
            continue;
        }
        let Some((mut kw, rest)) = leading_keyword(&text) else {
            continue;
        };
        if kw == StmtKw::Constrain {
            match leading_keyword(rest) {
                Some((StmtKw::Macro, _)) => kw = StmtKw::Macro,
                _ => return Err(fail(buf, line, "'macro' keyword expected")),
            }
        }
        match kw {
            StmtKw::Macro => {
                salt_level += 1;
                if salt_level > 1 {
                    return Err(fail(buf, line, "Nested macro not allowed"));
                }
            }
            StmtKw::Endmacro => {
                salt_level -= 1;
                if salt_level < 0 {
                    return Err(fail(buf, line, "Unmatched 'endmacro' keyword"));
                }
            }
            StmtKw::While | StmtKw::Until | StmtKw::For | StmtKw::Loop => {
                let kind = match kw {
                    StmtKw::While => LoopKind::While,
                    StmtKw::Until => LoopKind::Until,
                    StmtKw::For => LoopKind::For,
                    _ => LoopKind::Loop,
                };
                open.push(OpenBlock { kind, mark: line });
            }
            StmtKw::Break | StmtKw::Next => {
                if open.is_empty() {
                    return Err(fail(
                        buf,
                        line,
                        "'break' or 'next' outside of any loop block",
                    ));
                }
                let kind = if kw == StmtKw::Break {
                    LoopKind::Break
                } else {
                    LoopKind::Next
                };
                open.push(OpenBlock { kind, mark: line });
            }
            StmtKw::Endloop => {
                if open.is_empty() {
                    return Err(fail(buf, line, "Unmatched 'endloop' keyword"));
                }
                // Close records down to and including the innermost loop.
                loop {
                    let top = open.pop().expect("checked non-empty above");
                    let closes_loop = top.kind.is_loop();
                    // For the loop record, note the enclosing loop's
                    // marker so its `endloop` can be patched in later.
                    let parent_marker = if closes_loop {
                        open.iter().rev().find(|b| b.kind.is_loop()).map(|b| b.mark)
                    } else {
                        None
                    };
                    done.push((
                        LoopBlock {
                            kind: top.kind,
                            mark: top.mark,
                            jump: line,
                            brk: None,
                        },
                        parent_marker,
                    ));
                    if closes_loop {
                        break;
                    }
                    if open.is_empty() {
                        return Err(fail(buf, line, "Unmatched 'endloop' keyword"));
                    }
                }
            }
            _ => {}
        }
    }

    if let Some(block) = open.first() {
        return Err(fail(buf, block.mark, "Unmatched loop keyword"));
    }
    if salt_level > 0 {
        return Err(fail(buf, buf.first_line(), "Unmatched 'macro' keyword"));
    }

    // Resolve each recorded parent marker to the parent's endloop line.
    let mut blocks: Vec<LoopBlock> = Vec::with_capacity(done.len());
    for (mut block, parent_marker) in done.iter().cloned() {
        if let Some(marker) = parent_marker {
            let parent = done
                .iter()
                .find(|(b, _)| b.kind.is_loop() && b.mark == marker)
                .ok_or_else(|| {
                    fail(buf, block.mark, "Parent of loop block not found during scan")
                })?;
            block.brk = Some(parent.0.jump);
        }
        blocks.push(block);
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks_for(src: &str) -> EdResult<(Buffer, Vec<LoopBlock>)> {
        let buf = Buffer::from_text("@test", src);
        let blocks = preprocess(&buf)?;
        Ok((buf, blocks))
    }

    fn line_of(buf: &Buffer, id: LineId) -> usize {
        buf.line_number(id)
    }

    #[test]
    fn resolves_single_loop() {
        let (buf, blocks) = blocks_for("x = 0\nwhile x < 3\n  x = x + 1\nendloop\n").unwrap();
        assert_eq!(blocks.len(), 1);
        let b = &blocks[0];
        assert_eq!(b.kind, LoopKind::While);
        assert_eq!(line_of(&buf, b.mark), 2);
        assert_eq!(line_of(&buf, b.jump), 4);
        assert!(b.brk.is_none());
    }

    #[test]
    fn nested_loops_record_parent_endloop() {
        let src = "\
loop
  until done
    break 2
  endloop
endloop
";
        let (buf, blocks) = blocks_for(src).unwrap();
        assert_eq!(blocks.len(), 3);
        let until = blocks
            .iter()
            .find(|b| b.kind == LoopKind::Until)
            .expect("inner loop block");
        assert_eq!(line_of(&buf, until.jump), 4);
        assert_eq!(
            until.brk.map(|l| line_of(&buf, l)),
            Some(5),
            "inner loop's break target is the outer endloop"
        );
        let brk = blocks
            .iter()
            .find(|b| b.kind == LoopKind::Break)
            .expect("break block");
        assert_eq!(line_of(&buf, brk.jump), 4, "break jumps to its endloop");
        let outer = blocks
            .iter()
            .find(|b| b.kind == LoopKind::Loop)
            .expect("outer loop block");
        assert!(outer.brk.is_none());
    }

    #[test]
    fn break_and_next_attach_to_innermost_loop() {
        let src = "while a\n  next\nendloop\nwhile b\n  break\nendloop\n";
        let (buf, blocks) = blocks_for(src).unwrap();
        let next = blocks.iter().find(|b| b.kind == LoopKind::Next).unwrap();
        assert_eq!(line_of(&buf, next.jump), 3);
        let brk = blocks.iter().find(|b| b.kind == LoopKind::Break).unwrap();
        assert_eq!(line_of(&buf, brk.jump), 6);
    }

    #[test]
    fn continuation_lines_are_skipped() {
        let src = "x = 1 + \\\nwhile\nloop\nendloop\n";
        let (_, blocks) = blocks_for(src).unwrap();
        // The "while" on the continuation line is not a keyword line.
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, LoopKind::Loop);
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let src = "# while in a comment\n\n  # another\nloop\nendloop\n";
        let (_, blocks) = blocks_for(src).unwrap();
        assert_eq!(blocks.len(), 1);
    }

    #[test]
    fn orphan_break_rejected() {
        let err = blocks_for("break\n").unwrap_err();
        assert!(err.message().unwrap().contains("outside of any loop"));
        assert!(err.message().unwrap().contains("at line 1"));
    }

    #[test]
    fn unmatched_keywords_rejected() {
        assert!(blocks_for("while x\n").is_err());
        assert!(blocks_for("endloop\n").is_err());
    }

    #[test]
    fn macro_nesting_rules() {
        let err = blocks_for("macro a\nmacro b\nendmacro\nendmacro\n").unwrap_err();
        assert!(err.message().unwrap().contains("Nested macro"));
        let err = blocks_for("endmacro\n").unwrap_err();
        assert!(err.message().unwrap().contains("endmacro"));
        let err = blocks_for("macro a\n").unwrap_err();
        assert!(err.message().unwrap().contains("'macro'"));
        assert!(blocks_for("macro a\nendmacro\n").is_ok());
    }

    #[test]
    fn constrain_requires_macro() {
        let err = blocks_for("constrain loop\nendloop\n").unwrap_err();
        assert!(err.message().unwrap().contains("'macro' keyword expected"));
        assert!(blocks_for("constrain macro a\nendmacro\n").is_ok());
    }
}
