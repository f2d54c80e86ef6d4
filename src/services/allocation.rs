// src/services/allocation.rs
//
// Política canônica de alocação: "obrigação mais antiga primeiro".
// Esta é a ÚNICA implementação da ordem de alocação. O preview e a
// gravação passam pelos mesmos dois passos (ordenar + planejar); qualquer
// tela que mostre "como esse pagamento seria distribuído" deve chamar
// estas funções, nunca reimplementar a regra.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::billing::Invoice;

/// Uma parcela do plano: quanto aplicar em qual fatura.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlannedApplication {
    pub invoice_id: Uuid,

    #[schema(example = "500.00")]
    pub amount: Decimal,
}

/// Simulação de alocação devolvida ao cliente sem gravar nada.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllocationPreview {
    #[schema(example = "700.00")]
    pub total_allocated: Decimal,
    #[schema(example = "300.00")]
    pub total_credit: Decimal,
    pub applications: Vec<PlannedApplication>,
}

/// Resultado puro da alocação: ainda nada foi gravado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationPlan {
    pub applications: Vec<PlannedApplication>,
    // Sobra que vira crédito se o plano for confirmado.
    pub credit_remainder: Decimal,
}

impl AllocationPlan {
    pub fn total_allocated(&self) -> Decimal {
        self.applications.iter().map(|a| a.amount).sum()
    }
}

/// Ordena pela regra canônica: vencimento mais próximo primeiro, faturas
/// SEM vencimento depois de todas as que têm, empate resolvido pela data
/// de emissão e por último pelo id (ordem estável e reprodutível).
pub fn sort_for_allocation(invoices: &mut [Invoice]) {
    invoices.sort_by(|a, b| {
        match (a.due_date, b.due_date) {
            (Some(da), Some(db)) => da.cmp(&db),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.invoice_date.cmp(&b.invoice_date))
        .then_with(|| a.id.cmp(&b.id))
    });
}

/// Percorre as faturas já ordenadas abatendo `min(restante, saldo)` de cada
/// uma; o que sobrar vira `credit_remainder`. Garantia de conservação:
/// `total_allocated() + credit_remainder == amount`, sempre.
pub fn plan_allocation(invoices: &[Invoice], amount: Decimal) -> AllocationPlan {
    let mut sorted: Vec<Invoice> = invoices.to_vec();
    sort_for_allocation(&mut sorted);

    let mut remaining = amount;
    let mut applications = Vec::new();

    for invoice in &sorted {
        if remaining <= Decimal::ZERO {
            break;
        }
        if invoice.balance <= Decimal::ZERO {
            continue;
        }

        let apply = remaining.min(invoice.balance);
        applications.push(PlannedApplication {
            invoice_id: invoice.id,
            amount: apply,
        });
        remaining -= apply;
    }

    AllocationPlan {
        applications,
        credit_remainder: remaining,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::billing::InvoiceStatus;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn invoice(balance: Decimal, total: Decimal, due: Option<NaiveDate>, emitted: u32) -> Invoice {
        Invoice {
            id: Uuid::new_v4(),
            customer_id: Uuid::new_v4(),
            total_amount: total,
            balance,
            status: InvoiceStatus::derive(balance, total, due, day(1)),
            due_date: due,
            invoice_date: day(emitted),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn paga_vencimento_mais_antigo_primeiro() {
        // D1 < D2 < D3 e uma fatura sem vencimento; o pagamento cobre a
        // primeira inteira e parte da segunda. D3 e a sem vencimento não
        // podem ser tocadas.
        let d1 = invoice(dec!(200), dec!(200), Some(day(5)), 1);
        let d2 = invoice(dec!(300), dec!(300), Some(day(10)), 2);
        let d3 = invoice(dec!(400), dec!(400), Some(day(20)), 3);
        let sem_venc = invoice(dec!(100), dec!(100), None, 1);

        // Entrega embaralhado de propósito: a ordem de entrada não importa.
        let invoices = vec![sem_venc.clone(), d3.clone(), d2.clone(), d1.clone()];
        let plan = plan_allocation(&invoices, dec!(350));

        assert_eq!(plan.applications.len(), 2);
        assert_eq!(plan.applications[0].invoice_id, d1.id);
        assert_eq!(plan.applications[0].amount, dec!(200));
        assert_eq!(plan.applications[1].invoice_id, d2.id);
        assert_eq!(plan.applications[1].amount, dec!(150));
        assert_eq!(plan.credit_remainder, dec!(0));
    }

    #[test]
    fn sem_vencimento_vai_para_o_fim_da_fila() {
        let com_venc = invoice(dec!(100), dec!(100), Some(day(25)), 10);
        let sem_venc = invoice(dec!(100), dec!(100), None, 1);

        let plan = plan_allocation(&[sem_venc.clone(), com_venc.clone()], dec!(150));

        assert_eq!(plan.applications[0].invoice_id, com_venc.id);
        assert_eq!(plan.applications[1].invoice_id, sem_venc.id);
        assert_eq!(plan.applications[1].amount, dec!(50));
    }

    #[test]
    fn empate_de_vencimento_resolve_pela_data_de_emissao() {
        let emitida_depois = invoice(dec!(100), dec!(100), Some(day(15)), 8);
        let emitida_antes = invoice(dec!(100), dec!(100), Some(day(15)), 3);

        let plan = plan_allocation(&[emitida_depois.clone(), emitida_antes.clone()], dec!(100));

        assert_eq!(plan.applications.len(), 1);
        assert_eq!(plan.applications[0].invoice_id, emitida_antes.id);
    }

    #[test]
    fn sobra_vira_credito_exato() {
        // RecordPayment(1000) contra uma única fatura de saldo 700:
        // 700 alocados, 300 de troco.
        let fatura = invoice(dec!(700), dec!(700), Some(day(5)), 1);

        let plan = plan_allocation(&[fatura], dec!(1000));

        assert_eq!(plan.total_allocated(), dec!(700));
        assert_eq!(plan.credit_remainder, dec!(300));
    }

    #[test]
    fn conservacao_nunca_cria_nem_some_dinheiro() {
        let invoices = vec![
            invoice(dec!(123.45), dec!(200), Some(day(2)), 1),
            invoice(dec!(0.01), dec!(50), Some(day(3)), 1),
            invoice(dec!(999.99), dec!(1000), None, 2),
        ];

        for amount in [dec!(0.01), dec!(123.45), dec!(123.46), dec!(5000)] {
            let plan = plan_allocation(&invoices, amount);
            assert_eq!(plan.total_allocated() + plan.credit_remainder, amount);
            // Nenhuma aplicação passa do saldo da fatura.
            for app in &plan.applications {
                let inv = invoices.iter().find(|i| i.id == app.invoice_id).unwrap();
                assert!(app.amount > dec!(0));
                assert!(app.amount <= inv.balance);
            }
        }
    }

    #[test]
    fn fatura_sem_saldo_e_ignorada() {
        let quitada = invoice(dec!(0), dec!(100), Some(day(1)), 1);
        let aberta = invoice(dec!(100), dec!(100), Some(day(9)), 2);

        let plan = plan_allocation(&[quitada, aberta.clone()], dec!(80));

        assert_eq!(plan.applications.len(), 1);
        assert_eq!(plan.applications[0].invoice_id, aberta.id);
    }

    #[test]
    fn mesmo_conjunto_gera_sempre_o_mesmo_plano() {
        let invoices = vec![
            invoice(dec!(10), dec!(10), Some(day(4)), 1),
            invoice(dec!(20), dec!(20), Some(day(4)), 1),
            invoice(dec!(30), dec!(30), None, 2),
        ];

        let primeiro = plan_allocation(&invoices, dec!(45));
        for _ in 0..10 {
            assert_eq!(plan_allocation(&invoices, dec!(45)), primeiro);
        }
    }
}
