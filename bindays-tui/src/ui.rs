use bindays_core::{BinColour, BinDay};
use chrono::{Local, NaiveDate};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};

use crate::app::{App, Screen};

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("bindays – UK bin collection days")
        .block(Block::default().borders(Borders::ALL).title("Bindays"));
    frame.render_widget(header, *header_area);

    match app.screen {
        Screen::PostcodeInput => draw_postcode_input(frame, app, *content_area),
        Screen::AddressSelect => draw_address_select(frame, app, *content_area),
        Screen::BinDaysView => draw_bin_days(frame, app, *content_area),
    }

    let nav_hint = match app.screen {
        Screen::PostcodeInput => "Type a postcode · Enter look up · Esc/Ctrl-C quit",
        Screen::AddressSelect => "↑/↓ move · Enter/→ bin days · Esc/← new postcode · q quit",
        Screen::BinDaysView => "Esc/←/b back to addresses · q quit",
    };

    let status_text = if app.is_loading {
        format!("Loading… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_postcode_input(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [input_area, collectors_area] = chunks else {
        return;
    };

    let input = Paragraph::new(app.postcode_input.as_str())
        .block(Block::default().borders(Borders::ALL).title("Postcode (Enter)"))
        .wrap(Wrap { trim: true });
    frame.render_widget(input, *input_area);

    let items = app
        .collectors
        .iter()
        .map(|meta| ListItem::new(format!("{} ({})", meta.name, meta.website_url)))
        .collect::<Vec<ListItem<'_>>>();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Supported councils"),
    );
    frame.render_widget(list, *collectors_area);
}

fn draw_address_select(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let council = app
        .collector
        .as_ref()
        .map_or("<council>", |meta| meta.name.as_str());

    let items = if app.addresses.is_empty() {
        vec![ListItem::new("No addresses for this postcode.")]
    } else {
        app.addresses
            .iter()
            .map(|address| ListItem::new(address.label()))
            .collect()
    };

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Addresses served by {council} (↑/↓, Enter)")),
        )
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        );

    let mut state = ListState::default();
    if !app.addresses.is_empty() {
        state.select(Some(app.address_list_index));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_bin_days(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let address_label = app
        .selected_address
        .as_ref()
        .map_or_else(|| "<address>".to_owned(), bindays_core::Address::label);

    let title = format!("Bin days for {address_label} (Esc/←/b to go back)");

    if app.is_loading {
        let paragraph = Paragraph::new("Loading bin days…")
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    if app.bin_days.is_empty() {
        let paragraph = Paragraph::new("No upcoming collections.")
            .block(Block::default().borders(Borders::ALL).title(title))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
        return;
    }

    let today = Local::now().date_naive();

    let rows = app.bin_days.iter().map(|bin_day| {
        let date = bin_day.date.format("%d/%m/%Y").to_string();
        let weekday = bin_day.date.format("%a").to_string();
        let relative = relative_day_label(bin_day.date, today);

        let mut style = Style::default().fg(bin_day_colour(bin_day));
        if bin_day.date <= today {
            style = style.add_modifier(Modifier::BOLD);
        }

        Row::new(vec![
            Cell::from(date),
            Cell::from(weekday),
            Cell::from(relative),
            Cell::from(bins_label(bin_day)),
        ])
        .style(style)
    });

    let column_widths = [
        Constraint::Length(12),
        Constraint::Length(6),
        Constraint::Length(12),
        Constraint::Min(20),
    ];

    let table = Table::new(rows, column_widths)
        .header(
            Row::new(vec!["Date", "Day", "In", "Bins"])
                .style(Style::default().add_modifier(Modifier::BOLD)),
        )
        .block(Block::default().borders(Borders::ALL).title(title))
        .column_spacing(1);

    frame.render_widget(table, area);
}

fn bins_label(bin_day: &BinDay) -> String {
    bin_day
        .bins
        .iter()
        .map(|bin| format!("{} ({})", bin.name, bin.colour))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bin_day_colour(bin_day: &BinDay) -> Color {
    bin_day
        .bins
        .first()
        .map_or(Color::Reset, |bin| bin_colour(bin.colour))
}

fn bin_colour(colour: BinColour) -> Color {
    match colour {
        BinColour::Black => Color::DarkGray,
        BinColour::Blue => Color::Blue,
        BinColour::Brown => Color::Rgb(150, 90, 40),
        BinColour::Green => Color::Green,
        BinColour::Grey => Color::Gray,
        BinColour::Orange => Color::Rgb(255, 165, 0),
        BinColour::Pink => Color::LightMagenta,
        BinColour::Purple => Color::Magenta,
        BinColour::Red => Color::Red,
        BinColour::White => Color::White,
        BinColour::Yellow => Color::Yellow,
    }
}

fn relative_day_label(date: NaiveDate, today: NaiveDate) -> String {
    let delta = (date - today).num_days();
    match delta {
        0 => "today".to_owned(),
        1 => "tomorrow".to_owned(),
        days if days > 1 => format!("in {days} days"),
        -1 => "yesterday".to_owned(),
        days => format!("{} days ago", days.abs()),
    }
}

#[cfg(test)]
mod tests {
    use bindays_core::{Address, Bin, BinType};
    use pretty_assertions::assert_eq;

    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
    }

    #[test]
    fn relative_labels() {
        let today = date(2026, 10, 16);
        assert_eq!(relative_day_label(today, today), "today");
        assert_eq!(relative_day_label(date(2026, 10, 17), today), "tomorrow");
        assert_eq!(relative_day_label(date(2026, 10, 20), today), "in 4 days");
    }

    #[test]
    fn rows_take_the_first_bin_colour() {
        let bin_day = BinDay {
            date: date(2026, 10, 20),
            address: Address::default(),
            bins: vec![
                Bin::new("Recycling", BinColour::Blue, Some(BinType::Bin), &["recycl"]),
                Bin::new("Food Waste", BinColour::Grey, Some(BinType::Caddy), &["food"]),
            ],
        };

        assert_eq!(bin_day_colour(&bin_day), Color::Blue);
        assert_eq!(bins_label(&bin_day), "Recycling (Blue), Food Waste (Grey)");
    }
}
