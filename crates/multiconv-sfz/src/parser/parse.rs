use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_until, take_while1};
use nom::character::complete::{char, not_line_ending, space0, space1};
use nom::combinator::{map, recognize};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::IResult;

use crate::parser::error::Error;
use crate::parser::types::{SfzFile, SfzSection, SfzSectionType};

/// Result type alias for parser functions
type Result<T> = std::result::Result<T, Error>;

/// A lexical element of an SFZ file
#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    /// `<name>`
    Header(&'a str),
    /// `name=value`
    Opcode(&'a str, &'a str),
    /// `#define $NAME value`
    Define(&'a str, &'a str),
    /// `#include "path"`
    Include(&'a str),
}

/// Parse an SFZ file from a string
///
/// SFZ files consist of:
///
/// 1. **Section headers**: enclosed in angle brackets, like `<region>` or `<global>`
/// 2. **Opcodes**: `name=value` pairs. Several opcodes may share a line; a value
///    extends to the next `name=` token, header or line end, so sample paths may
///    contain spaces
/// 3. **Comments**: `// line` and `/* block */`
/// 4. **Directives**: `#define $NAME value` substitutes `$NAME` in later opcode
///    names and values; `#include` is not followed and only logged
///
/// Sections are not flattened here. Every master, group and region records the
/// sections enclosing it and lookups resolve inheritance later.
///
/// # Errors
///
/// Unterminated headers and block comments, and `#define` without a variable
/// name fail with [`Error::ParseAt`].
pub fn parse_sfz(content: &str) -> Result<SfzFile> {
    let text = strip_comments(content)?;
    let mut builder = Builder::new(content);

    let mut rest = text.as_str();
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let offset = text.len() - trimmed.len();

        let parsed: IResult<&str, Token> = if trimmed.starts_with('<') {
            header(trimmed)
        } else if trimmed.starts_with('#') {
            directive(trimmed)
        } else {
            opcode(trimmed)
        };

        rest = match parsed {
            Ok((remaining, token)) => {
                builder.apply(token, offset)?;
                remaining
            }
            Err(_) if trimmed.starts_with('<') => return Err(Error::at(content, offset, "unterminated header")),
            Err(_) if trimmed.starts_with("#define") => {
                return Err(Error::at(content, offset, "#define without variable name"))
            }
            Err(_) if trimmed.starts_with('#') => {
                let (remaining, line) = line_rest(trimmed);
                log::warn!("Ignoring unknown directive '{}'", line.trim());
                remaining
            }
            Err(_) => {
                let (remaining, word) = word(trimmed);
                log::warn!("Ignoring unexpected text '{}' at line {}", word, builder.line_at(offset));
                remaining
            }
        };
    }

    Ok(builder.finish())
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn header(input: &str) -> IResult<&str, Token> {
    map(delimited(char('<'), take_while1(is_name_char), char('>')), Token::Header)(input)
}

fn directive(input: &str) -> IResult<&str, Token> {
    alt((define_directive, include_directive))(input)
}

fn define_directive(input: &str) -> IResult<&str, Token> {
    let (input, _) = pair(tag("#define"), space1)(input)?;
    let (input, name) = recognize(pair(char('$'), take_while1(is_name_char)))(input)?;
    let (input, value) = preceded(space0, not_line_ending)(input)?;
    Ok((input, Token::Define(name, value.trim())))
}

fn include_directive(input: &str) -> IResult<&str, Token> {
    let (input, _) = pair(tag("#include"), space0)(input)?;
    map(delimited(char('"'), take_until("\""), char('"')), Token::Include)(input)
}

fn opcode_name(input: &str) -> IResult<&str, &str> {
    terminated(take_while1(is_name_char), char('='))(input)
}

fn opcode(input: &str) -> IResult<&str, Token> {
    let (input, name) = opcode_name(input)?;
    let (input, value) = opcode_value(input)?;
    Ok((input, Token::Opcode(name, value.trim())))
}

/// True if `input` is whitespace followed by the start of another opcode.
fn starts_next_opcode(input: &str) -> bool {
    let parsed: IResult<&str, &str> = preceded(space1, opcode_name)(input);
    parsed.is_ok()
}

/// The value of an opcode: everything up to a header, a line end or the next
/// `name=` token.
fn opcode_value(input: &str) -> IResult<&str, &str> {
    for (i, c) in input.char_indices() {
        if c == '<' || c == '\n' || c == '\r' || (c.is_whitespace() && starts_next_opcode(&input[i..])) {
            return Ok((&input[i..], &input[..i]));
        }
    }
    Ok(("", input))
}

fn word(input: &str) -> (&str, &str) {
    let parsed: IResult<&str, &str> = take_till(char::is_whitespace)(input);
    parsed.unwrap_or(("", input))
}

fn line_rest(input: &str) -> (&str, &str) {
    let parsed: IResult<&str, &str> = not_line_ending(input);
    parsed.unwrap_or(("", input))
}

/// Replace comments with blanks, keeping byte offsets and line breaks.
fn strip_comments(content: &str) -> Result<String> {
    fn blank(out: &mut String, comment: &str) {
        for c in comment.chars() {
            if c == '\n' {
                out.push('\n');
            } else {
                out.extend(std::iter::repeat(' ').take(c.len_utf8()));
            }
        }
    }

    let mut out = String::with_capacity(content.len());
    let mut rest = content;
    while let Some(pos) = rest.find('/') {
        let (before, after) = rest.split_at(pos);
        out.push_str(before);
        if after.starts_with("//") {
            let end = after.find('\n').unwrap_or(after.len());
            blank(&mut out, &after[..end]);
            rest = &after[end..];
        } else if after.starts_with("/*") {
            match after[2..].find("*/") {
                Some(end) => {
                    let len = end + 4;
                    blank(&mut out, &after[..len]);
                    rest = &after[len..];
                }
                None => {
                    let offset = content.len() - after.len();
                    return Err(Error::at(content, offset, "unterminated block comment"));
                }
            }
        } else {
            out.push('/');
            rest = &after[1..];
        }
    }
    out.push_str(rest);
    Ok(out)
}

/// Assembles sections from tokens.
struct Builder<'c> {
    content: &'c str,
    sfz: SfzFile,
    current: Option<(SfzSectionType, usize)>,
    master: Option<usize>,
    group: Option<usize>,
    /// Sorted by descending name length so that `$AB` wins over `$A`.
    defines: Vec<(String, String)>,
    line: usize,
    line_offset: usize,
}

impl<'c> Builder<'c> {
    fn new(content: &'c str) -> Self {
        Self {
            content,
            sfz: SfzFile::new(),
            current: None,
            master: None,
            group: None,
            defines: Vec::new(),
            line: 1,
            line_offset: 0,
        }
    }

    /// Line of `offset`. Offsets must not decrease between calls.
    fn line_at(&mut self, offset: usize) -> usize {
        let offset = offset.min(self.content.len());
        if offset > self.line_offset {
            self.line += self.content.as_bytes()[self.line_offset..offset]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            self.line_offset = offset;
        }
        self.line
    }

    fn apply(&mut self, token: Token, offset: usize) -> Result<()> {
        match token {
            Token::Header(name) => {
                let line = self.line_at(offset);
                match SfzSectionType::from_header(name) {
                    Some(section_type) => self.start_section(section_type, line),
                    None => {
                        log::warn!("Ignoring unknown header <{}> at line {}", name, line);
                        self.current = None;
                    }
                }
            }
            Token::Opcode(name, value) => {
                let name = self.substitute(name);
                let value = self.substitute(value);
                match self.current_section_mut() {
                    Some(section) => section.add_opcode(name, value),
                    None => {
                        let line = self.line_at(offset);
                        log::warn!("Ignoring opcode '{}' outside of a known section at line {}", name, line);
                    }
                }
            }
            Token::Define(name, value) => {
                self.defines.retain(|(n, _)| n != name);
                self.defines.push((name.to_string(), value.to_string()));
                self.defines.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
            }
            Token::Include(path) => {
                log::warn!("#include \"{}\" is not supported, ignoring it", path);
            }
        }
        Ok(())
    }

    fn substitute(&self, text: &str) -> String {
        if !text.contains('$') {
            return text.to_string();
        }
        self.defines
            .iter()
            .fold(text.to_string(), |acc, (name, value)| acc.replace(name.as_str(), value))
    }

    fn start_section(&mut self, section_type: SfzSectionType, line: usize) {
        let mut section = SfzSection::new(section_type);
        section.line = line;
        let index = match section_type {
            SfzSectionType::Control => {
                self.sfz.control.get_or_insert(section);
                0
            }
            SfzSectionType::Global => {
                self.sfz.global.get_or_insert(section);
                self.master = None;
                self.group = None;
                0
            }
            SfzSectionType::Master => {
                self.sfz.masters.push(section);
                self.master = Some(self.sfz.masters.len() - 1);
                self.group = None;
                self.sfz.masters.len() - 1
            }
            SfzSectionType::Group => {
                section.master = self.master;
                self.sfz.groups.push(section);
                self.group = Some(self.sfz.groups.len() - 1);
                self.sfz.groups.len() - 1
            }
            SfzSectionType::Region => {
                section.master = self.master;
                section.group = self.group;
                self.sfz.regions.push(section);
                self.sfz.regions.len() - 1
            }
            SfzSectionType::Curve => {
                self.sfz.curves.push(section);
                self.sfz.curves.len() - 1
            }
            SfzSectionType::Effect => {
                self.sfz.effects.push(section);
                self.sfz.effects.len() - 1
            }
        };
        self.current = Some((section_type, index));
    }

    fn current_section_mut(&mut self) -> Option<&mut SfzSection> {
        let (section_type, index) = self.current?;
        match section_type {
            SfzSectionType::Control => self.sfz.control.as_mut(),
            SfzSectionType::Global => self.sfz.global.as_mut(),
            SfzSectionType::Master => self.sfz.masters.get_mut(index),
            SfzSectionType::Group => self.sfz.groups.get_mut(index),
            SfzSectionType::Region => self.sfz.regions.get_mut(index),
            SfzSectionType::Curve => self.sfz.curves.get_mut(index),
            SfzSectionType::Effect => self.sfz.effects.get_mut(index),
        }
    }

    fn finish(self) -> SfzFile {
        self.sfz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_sfz() {
        let content = r#"
        <control>
        default_path=samples/piano/

        <global>
        volume=0

        <region>
        sample=piano_C3.wav
        key=60
        "#;

        let sfz = parse_sfz(content).expect("Failed to parse SFZ");

        assert_eq!(sfz.default_path(), Some("samples/piano/"));
        assert_eq!(sfz.global.as_ref().unwrap().opcodes["volume"], "0");
        assert_eq!(sfz.regions.len(), 1);
        assert_eq!(sfz.regions[0].opcodes["sample"], "piano_C3.wav");
        assert_eq!(sfz.regions[0].opcodes["key"], "60");
        assert_eq!(sfz.regions[0].line, 8);
    }

    #[test]
    fn test_values_with_spaces_and_several_opcodes_per_line() {
        let content = "<region> sample=My Piano C4.wav lokey=c4 hikey=62 pan=-10<region>key=70";
        let sfz = parse_sfz(content).unwrap();
        assert_eq!(sfz.regions.len(), 2);
        let region = &sfz.regions[0];
        assert_eq!(region.opcodes["sample"], "My Piano C4.wav");
        assert_eq!(region.opcodes["lokey"], "c4");
        assert_eq!(region.opcodes["hikey"], "62");
        assert_eq!(region.opcodes["pan"], "-10");
        assert_eq!(sfz.regions[1].opcodes["key"], "70");
    }

    #[test]
    fn test_comments_are_removed() {
        let content = "/* header\n comment */ <group> volume=-3 // trailing\n<region> sample=a.wav // x=1\n";
        let sfz = parse_sfz(content).unwrap();
        assert_eq!(sfz.groups[0].opcodes["volume"], "-3");
        assert_eq!(sfz.regions[0].opcodes.len(), 1);
        assert_eq!(sfz.regions[0].opcodes["sample"], "a.wav");
        assert_eq!(sfz.regions[0].line, 3);
    }

    #[test]
    fn test_defines_are_substituted() {
        let content = "#define $LO 36\n#define $LOUD -2\n<region> sample=a.wav lokey=$LO volume=$LOUD";
        let sfz = parse_sfz(content).unwrap();
        assert_eq!(sfz.regions[0].opcodes["lokey"], "36");
        assert_eq!(sfz.regions[0].opcodes["volume"], "-2");
    }

    #[test]
    fn test_enclosing_sections_are_recorded() {
        let content = "<global>a=1<master>b=2<group>c=3<region>d=4<master><region>e=5<global><region>f=6";
        let sfz = parse_sfz(content).unwrap();
        assert_eq!(sfz.regions[0].group, Some(0));
        assert_eq!(sfz.regions[0].master, Some(0));
        assert_eq!(sfz.regions[1].group, None);
        assert_eq!(sfz.regions[1].master, Some(1));
        assert_eq!(sfz.regions[2].master, None);
        assert_eq!(sfz.global.as_ref().unwrap().opcodes.len(), 1);
    }

    #[test]
    fn test_unknown_header_and_stray_text_are_ignored() {
        let content = "orphan=1 <foo> x=1 <region> sample=a.wav garbage key=60";
        let sfz = parse_sfz(content).unwrap();
        assert_eq!(sfz.regions.len(), 1);
        assert_eq!(sfz.regions[0].opcodes["sample"], "a.wav garbage");
        assert_eq!(sfz.regions[0].opcodes["key"], "60");
    }

    #[test]
    fn test_errors_carry_position() {
        match parse_sfz("<region>\nkey=60\n<regi") {
            Err(Error::ParseAt { line, column, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(column, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert!(matches!(parse_sfz("<region> /* open"), Err(Error::ParseAt { line: 1, column: 10, .. })));
        assert!(matches!(parse_sfz("#define 36"), Err(Error::ParseAt { .. })));
    }
}
